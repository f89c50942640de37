//! Control channel framing
//!
//! Splits the inbound byte stream into command lines and encodes outbound
//! replies. CRLF, bare LF and the legacy CR NUL are all accepted as line
//! terminators.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::protocol::responses::Reply;

/// Default ceiling on a single command line.
pub const MAX_LINE_LENGTH: usize = 8192;

#[derive(Debug)]
pub struct ControlCodec {
    max_length: usize,
    /// Bytes already scanned without finding a terminator.
    scanned: usize,
}

impl ControlCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            scanned: 0,
        }
    }

    /// Position and width of the first terminator in `buf`, if complete.
    fn find_terminator(&self, buf: &[u8]) -> Option<(usize, usize)> {
        let start = self.scanned.min(buf.len());
        for i in start..buf.len() {
            match buf[i] {
                b'\n' => return Some((i, 1)),
                b'\r' => match buf.get(i + 1) {
                    Some(b'\n') | Some(0) => return Some((i, 2)),
                    // A trailing CR may still become CRLF or CR NUL.
                    None => return None,
                    Some(_) => {}
                },
                _ => {}
            }
        }
        None
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}

impl Decoder for ControlCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        match self.find_terminator(buf) {
            Some((end, width)) => {
                self.scanned = 0;
                if end > self.max_length {
                    return Err(CodecError::LineTooLong(self.max_length));
                }
                let line = buf.split_to(end);
                buf.advance(width);
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None => {
                if buf.len() > self.max_length {
                    return Err(CodecError::LineTooLong(self.max_length));
                }
                // Re-check a trailing CR once more bytes arrive.
                self.scanned = buf.len().saturating_sub(1);
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        self.scanned = 0;
        let rest = buf.split();
        let text = String::from_utf8_lossy(&rest);
        Ok(Some(text.trim_end_matches('\r').to_string()))
    }
}

impl Encoder<Reply> for ControlCodec {
    type Error = CodecError;

    fn encode(&mut self, reply: Reply, buf: &mut BytesMut) -> Result<(), CodecError> {
        let wire = reply.to_wire();
        buf.reserve(wire.len());
        buf.put_slice(wire.as_bytes());
        Ok(())
    }
}
