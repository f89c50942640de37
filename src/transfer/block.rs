//! Data channel codec
//!
//! Frames file content on the data connection according to the negotiated
//! MODE/STRU/TYPE. Stream mode carries raw bytes (with record escapes when
//! STRU R is active); block mode carries a descriptor byte, a big-endian
//! 16-bit count and the payload.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::transfer::modes::{CodecParams, DataType, Structure, TransmissionMode};

pub const FLAG_EOR: u8 = 0x80;
pub const FLAG_EOF: u8 = 0x40;
pub const FLAG_ERROR: u8 = 0x20;
pub const FLAG_RESTART: u8 = 0x10;

/// Largest payload a single block header can describe.
pub const MAX_BLOCK_PAYLOAD: usize = u16::MAX as usize;

const BLOCK_HEADER_LEN: usize = 3;
const RECORD_ESCAPE: u8 = 0xFF;

/// A unit of data moving over the data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    pub descriptor: u8,
    pub payload: Bytes,
}

impl DataBlock {
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self {
            descriptor: 0,
            payload: payload.into(),
        }
    }

    pub fn eof() -> Self {
        Self {
            descriptor: FLAG_EOF,
            payload: Bytes::new(),
        }
    }

    /// A restart marker block; the payload is the marker itself.
    pub fn restart(marker: impl Into<Bytes>) -> Self {
        Self {
            descriptor: FLAG_RESTART,
            payload: marker.into(),
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.descriptor |= flags;
        self
    }

    pub fn is_eof(&self) -> bool {
        self.descriptor & FLAG_EOF != 0
    }

    pub fn is_eor(&self) -> bool {
        self.descriptor & FLAG_EOR != 0
    }

    pub fn is_error(&self) -> bool {
        self.descriptor & FLAG_ERROR != 0
    }

    pub fn is_restart(&self) -> bool {
        self.descriptor & FLAG_RESTART != 0
    }

    /// File content carried by the block; restart markers carry none.
    pub fn content(&self) -> &[u8] {
        if self.is_restart() { &[] } else { &self.payload }
    }
}

/// Codec for the data channel, reconfigurable while the channel is live.
#[derive(Debug, Default)]
pub struct DataCodec {
    params: CodecParams,
    /// Last encoded byte was CR, so a leading LF in the next chunk is already paired.
    encoded_cr: bool,
    /// A decoded block ended in CR, held back until the next block shows
    /// whether it starts a CRLF pair.
    decoded_cr: bool,
}

impl DataCodec {
    pub fn new(params: CodecParams) -> Self {
        Self {
            params,
            encoded_cr: false,
            decoded_cr: false,
        }
    }

    pub fn params(&self) -> CodecParams {
        self.params
    }

    /// Applies renegotiated MODE/STRU/TYPE values to subsequent frames.
    pub fn set_params(&mut self, params: CodecParams) {
        self.params = params;
        self.encoded_cr = false;
        self.decoded_cr = false;
    }

    fn ascii(&self) -> bool {
        self.params.data_type == DataType::Ascii
    }

    fn record_escapes(&self) -> bool {
        self.params.mode == TransmissionMode::Stream && self.params.structure == Structure::Record
    }

    fn decode_stream(&mut self, buf: &mut BytesMut, eof: bool) -> Option<DataBlock> {
        if buf.is_empty() {
            return None;
        }
        if self.record_escapes() {
            return self.decode_stream_record(buf, eof);
        }

        let mut take = buf.len();
        // Hold back a trailing CR until we know whether LF follows.
        if self.ascii() && !eof && buf[take - 1] == b'\r' {
            take -= 1;
            if take == 0 {
                return None;
            }
        }
        let chunk = buf.split_to(take);
        let payload = if self.ascii() { crlf_to_lf(&chunk) } else { chunk.freeze() };
        Some(DataBlock::data(payload))
    }

    fn decode_stream_record(&mut self, buf: &mut BytesMut, eof: bool) -> Option<DataBlock> {
        let mut out = BytesMut::with_capacity(buf.len());
        let mut consumed = 0;
        let mut flags = 0;
        while consumed < buf.len() {
            let byte = buf[consumed];
            if byte != RECORD_ESCAPE {
                out.put_u8(byte);
                consumed += 1;
                continue;
            }
            let Some(&next) = buf.get(consumed + 1) else {
                if eof {
                    out.put_u8(byte);
                    consumed += 1;
                }
                break;
            };
            consumed += 2;
            match next {
                RECORD_ESCAPE => out.put_u8(RECORD_ESCAPE),
                control => {
                    if control & 0x01 != 0 {
                        flags |= FLAG_EOR;
                    }
                    if control & 0x02 != 0 {
                        flags |= FLAG_EOF;
                    }
                    break;
                }
            }
        }
        buf.advance(consumed);
        if out.is_empty() && flags == 0 {
            return None;
        }
        let payload = if self.ascii() { crlf_to_lf(&out) } else { out.freeze() };
        Some(DataBlock::data(payload).with_flags(flags))
    }

    fn decode_block(&mut self, buf: &mut BytesMut) -> Option<DataBlock> {
        if buf.len() < BLOCK_HEADER_LEN {
            return None;
        }
        let descriptor = buf[0];
        let count = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        if buf.len() < BLOCK_HEADER_LEN + count {
            buf.reserve(BLOCK_HEADER_LEN + count - buf.len());
            return None;
        }
        buf.advance(BLOCK_HEADER_LEN);
        let raw = buf.split_to(count);
        let payload = if self.ascii() && descriptor & FLAG_RESTART == 0 {
            self.translate_block_in(&raw, descriptor & FLAG_EOF != 0)
        } else {
            raw.freeze()
        };
        Some(DataBlock {
            descriptor,
            payload,
        })
    }

    /// CRLF to LF across block boundaries. A trailing CR is carried into the
    /// next block unless this one ends the file.
    fn translate_block_in(&mut self, raw: &[u8], last: bool) -> Bytes {
        if raw.is_empty() && !last {
            return Bytes::new();
        }
        let mut out = BytesMut::with_capacity(raw.len() + 1);
        if std::mem::take(&mut self.decoded_cr) && raw.first() != Some(&b'\n') {
            out.put_u8(b'\r');
        }
        let mut iter = raw.iter().peekable();
        while let Some(&byte) = iter.next() {
            if byte == b'\r' {
                match iter.peek() {
                    Some(&&b'\n') => continue,
                    None if !last => {
                        self.decoded_cr = true;
                        continue;
                    }
                    _ => {}
                }
            }
            out.put_u8(byte);
        }
        out.freeze()
    }

    fn translate_out(&mut self, payload: &[u8]) -> Bytes {
        if !self.ascii() {
            return Bytes::copy_from_slice(payload);
        }
        let mut out = BytesMut::with_capacity(payload.len() + payload.len() / 16);
        for &byte in payload {
            if byte == b'\n' && !self.encoded_cr {
                out.put_u8(b'\r');
            }
            out.put_u8(byte);
            self.encoded_cr = byte == b'\r';
        }
        out.freeze()
    }
}

fn crlf_to_lf(chunk: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(chunk.len());
    let mut iter = chunk.iter().peekable();
    while let Some(&byte) = iter.next() {
        if byte == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.put_u8(byte);
    }
    out.freeze()
}

impl Decoder for DataCodec {
    type Item = DataBlock;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<DataBlock>, io::Error> {
        Ok(match self.params.mode {
            TransmissionMode::Stream => self.decode_stream(buf, false),
            TransmissionMode::Block => self.decode_block(buf),
        })
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<DataBlock>, io::Error> {
        match self.params.mode {
            TransmissionMode::Stream => Ok(self.decode_stream(buf, true)),
            TransmissionMode::Block => match self.decode_block(buf) {
                Some(block) => Ok(Some(block)),
                None if buf.is_empty() => Ok(None),
                None => Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "data connection closed inside a block",
                )),
            },
        }
    }
}

impl Encoder<DataBlock> for DataCodec {
    type Error = io::Error;

    fn encode(&mut self, block: DataBlock, buf: &mut BytesMut) -> Result<(), io::Error> {
        let payload = if block.is_restart() {
            block.payload.clone()
        } else {
            self.translate_out(&block.payload)
        };

        match self.params.mode {
            TransmissionMode::Stream => {
                if self.record_escapes() {
                    for &byte in payload.iter() {
                        buf.put_u8(byte);
                        if byte == RECORD_ESCAPE {
                            buf.put_u8(RECORD_ESCAPE);
                        }
                    }
                    let control = u8::from(block.is_eor()) | (u8::from(block.is_eof()) << 1);
                    if control != 0 {
                        buf.put_slice(&[RECORD_ESCAPE, control]);
                    }
                } else {
                    buf.put_slice(&payload);
                }
            }
            TransmissionMode::Block => {
                let mut chunks = payload.chunks(MAX_BLOCK_PAYLOAD).peekable();
                if chunks.peek().is_none() {
                    buf.put_u8(block.descriptor);
                    buf.put_u16(0);
                }
                while let Some(chunk) = chunks.next() {
                    // Flags describe the whole block, so only the last piece carries them.
                    let descriptor = if chunks.peek().is_none() { block.descriptor } else { 0 };
                    buf.reserve(BLOCK_HEADER_LEN + chunk.len());
                    buf.put_u8(descriptor);
                    buf.put_u16(chunk.len() as u16);
                    buf.put_slice(chunk);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: TransmissionMode, structure: Structure, data_type: DataType) -> CodecParams {
        CodecParams {
            mode,
            structure,
            data_type,
        }
    }

    #[test]
    fn block_header_layout() {
        let mut codec = DataCodec::new(params(
            TransmissionMode::Block,
            Structure::File,
            DataType::Image,
        ));
        let mut buf = BytesMut::new();
        codec
            .encode(DataBlock::data(&b"abc"[..]).with_flags(FLAG_EOF), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0x40, 0x00, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn block_decode_waits_for_full_payload() {
        let mut codec = DataCodec::new(params(
            TransmissionMode::Block,
            Structure::File,
            DataType::Image,
        ));
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x04, b'a', b'b'][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"cd");
        let block = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&block.payload[..], b"abcd");
        assert!(!block.is_eof());
    }

    #[test]
    fn restart_block_carries_marker() {
        let mut codec = DataCodec::new(params(
            TransmissionMode::Block,
            Structure::File,
            DataType::Ascii,
        ));
        let mut buf = BytesMut::from(&[0x10, 0x00, 0x06, b'0', b'0', b'1', b'2', b'\r', b'\n'][..]);
        let block = codec.decode(&mut buf).unwrap().unwrap();
        assert!(block.is_restart());
        assert_eq!(block.payload.len(), 6);
        assert!(block.content().is_empty());
    }

    #[test]
    fn oversized_payload_is_split() {
        let mut codec = DataCodec::new(params(
            TransmissionMode::Block,
            Structure::File,
            DataType::Image,
        ));
        let mut buf = BytesMut::new();
        let payload = vec![7u8; MAX_BLOCK_PAYLOAD + 10];
        codec
            .encode(DataBlock::data(payload).with_flags(FLAG_EOF), &mut buf)
            .unwrap();
        assert_eq!(buf[0], 0);
        assert_eq!(&buf[1..3], &[0xFF, 0xFF]);
        let second = BLOCK_HEADER_LEN + MAX_BLOCK_PAYLOAD;
        assert_eq!(buf[second], FLAG_EOF);
        assert_eq!(&buf[second + 1..second + 3], &[0x00, 0x0A]);
    }

    #[test]
    fn truncated_block_at_eof_is_an_error() {
        let mut codec = DataCodec::new(params(
            TransmissionMode::Block,
            Structure::File,
            DataType::Image,
        ));
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x05, b'a'][..]);
        assert!(codec.decode_eof(&mut buf).is_err());
    }

    #[test]
    fn ascii_stream_translation() {
        let mut codec = DataCodec::default();
        let mut out = BytesMut::new();
        codec.encode(DataBlock::data(&b"a\nb\r\n"[..]), &mut out).unwrap();
        assert_eq!(&out[..], b"a\r\nb\r\n");

        let mut inbound = BytesMut::from(&b"x\r\ny\r"[..]);
        let first = codec.decode(&mut inbound).unwrap().unwrap();
        assert_eq!(&first.payload[..], b"x\ny");
        inbound.extend_from_slice(b"\nz");
        let second = codec.decode(&mut inbound).unwrap().unwrap();
        assert_eq!(&second.payload[..], b"\nz");
    }

    #[test]
    fn record_structure_escapes_in_stream_mode() {
        let mut codec = DataCodec::new(params(
            TransmissionMode::Stream,
            Structure::Record,
            DataType::Image,
        ));
        let mut out = BytesMut::new();
        codec
            .encode(DataBlock::data(&[1u8, 0xFF, 2][..]).with_flags(FLAG_EOR), &mut out)
            .unwrap();
        assert_eq!(&out[..], &[1, 0xFF, 0xFF, 2, 0xFF, 0x01]);

        let block = codec.decode(&mut out).unwrap().unwrap();
        assert_eq!(&block.payload[..], &[1, 0xFF, 2]);
        assert!(block.is_eor());
    }

    #[test]
    fn ascii_block_crlf_split_across_blocks() {
        let mut codec = DataCodec::new(params(
            TransmissionMode::Block,
            Structure::File,
            DataType::Ascii,
        ));
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x02, b'a', b'\r'][..]);
        buf.extend_from_slice(&[0x00, 0x00, 0x02, b'\n', b'b']);
        buf.extend_from_slice(&[0x00, 0x00, 0x02, b'c', b'\r']);
        buf.extend_from_slice(&[FLAG_EOF, 0x00, 0x01, b'd']);

        let mut content = Vec::new();
        while let Some(block) = codec.decode(&mut buf).unwrap() {
            content.extend_from_slice(block.content());
        }
        assert_eq!(content, b"a\nbc\rd");
    }

    #[test]
    fn ascii_block_trailing_cr_kept_at_eof() {
        let mut codec = DataCodec::new(params(
            TransmissionMode::Block,
            Structure::File,
            DataType::Ascii,
        ));
        let mut buf = BytesMut::from(&[FLAG_EOF, 0x00, 0x02, b'x', b'\r'][..]);
        let block = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&block.payload[..], b"x\r");
    }
}
