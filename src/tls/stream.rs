//! Upgradable transport
//!
//! A TCP stream that can be wrapped in TLS (AUTH TLS, PROT P) and unwrapped
//! again (CCC) without tearing down the connection.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use crate::error::TlsError;

/// How long a downgrade waits for the peer's close_notify.
const CLOSE_NOTIFY_WAIT: Duration = Duration::from_secs(2);

pub enum SecureStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl SecureStream {
    pub fn is_secure(&self) -> bool {
        matches!(self, SecureStream::Tls(_))
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            SecureStream::Plain(tcp) => tcp,
            SecureStream::Tls(tls) => tls.get_ref().0,
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().local_addr()
    }

    /// Runs the server side of a TLS handshake over the plain stream.
    pub async fn upgrade(self, acceptor: &TlsAcceptor) -> Result<SecureStream, TlsError> {
        match self {
            SecureStream::Plain(tcp) => {
                let tls = acceptor.accept(tcp).await.map_err(TlsError::Handshake)?;
                debug!("TLS handshake completed");
                Ok(SecureStream::Tls(Box::new(tls)))
            }
            SecureStream::Tls(_) => Err(TlsError::Config("stream is already secure".into())),
        }
    }

    /// Ends the TLS session and returns the bare TCP stream.
    pub async fn downgrade(self) -> io::Result<SecureStream> {
        match self {
            SecureStream::Plain(tcp) => Ok(SecureStream::Plain(tcp)),
            SecureStream::Tls(mut tls) => {
                tls.get_mut().1.send_close_notify();
                tls.flush().await?;

                // Consume the peer's close_notify so it is not read as plaintext.
                let mut scratch = [0u8; 256];
                loop {
                    match tokio::time::timeout(CLOSE_NOTIFY_WAIT, tls.read(&mut scratch)).await {
                        Ok(Ok(0)) | Err(_) => break,
                        Ok(Ok(n)) => debug!("Discarded {n} bytes received during TLS shutdown"),
                        Ok(Err(e)) => return Err(e),
                    }
                }

                let (tcp, _) = tls.into_inner();
                Ok(SecureStream::Plain(tcp))
            }
        }
    }

    pub async fn shutdown_quietly(mut self) {
        if let Err(e) = self.shutdown().await {
            debug!("Shutdown of stream failed: {e}");
        }
    }
}

impl AsyncRead for SecureStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureStream::Plain(tcp) => Pin::new(tcp).poll_read(cx, buf),
            SecureStream::Tls(tls) => Pin::new(tls.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SecureStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SecureStream::Plain(tcp) => Pin::new(tcp).poll_write(cx, buf),
            SecureStream::Tls(tls) => Pin::new(tls.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureStream::Plain(tcp) => Pin::new(tcp).poll_flush(cx),
            SecureStream::Tls(tls) => Pin::new(tls.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureStream::Plain(tcp) => Pin::new(tcp).poll_shutdown(cx),
            SecureStream::Tls(tls) => Pin::new(tls.as_mut()).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for SecureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_secure() { "Tls" } else { "Plain" };
        f.debug_struct("SecureStream")
            .field("kind", &kind)
            .field("peer", &self.peer_addr().ok())
            .finish()
    }
}
