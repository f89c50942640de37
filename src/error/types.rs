//! Error types
//!
//! Defines domain-specific error types for each layer of the FTP engine.

use std::io;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::protocol::responses::{Reply, ReplyCode};

/// Control channel framing errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Command line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// PORT/EPRT argument errors
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Malformed address argument: {0}")]
    Malformed(String),

    #[error("Invalid port in address argument: {0}")]
    InvalidPort(String),

    #[error("Address family does not match address: {0}")]
    FamilyMismatch(String),

    #[error("Unsupported network protocol: {0}")]
    UnsupportedFamily(String),
}

/// Authentication module errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid password for user: {0}")]
    InvalidPassword(String),

    #[error("Invalid account for user: {0}")]
    InvalidAccount(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Storage module errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a regular file: {0}")]
    NotAFile(String),

    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// TLS setup and handshake errors
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Failed to load TLS certificate: {0}")]
    CertificateLoad(String),

    #[error("Failed to load TLS private key: {0}")]
    PrivateKeyLoad(String),

    #[error("TLS configuration error: {0}")]
    Config(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(io::Error),

    #[error("Plaintext bytes buffered across a security change")]
    BufferedPlaintext,

    #[error("TLS not configured")]
    NotConfigured,
}

/// Data connection and transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("A transfer is already in progress")]
    Busy,

    #[error("No PORT/EPRT or PASV/EPSV issued before the transfer")]
    NotConfigured,

    #[error("Data address {peer_ip} -> {local} already awaited by another session")]
    AddressInUse { peer_ip: IpAddr, local: SocketAddr },

    #[error("Stream-mode data channel still open from a previous transfer")]
    ChannelStillOpen,

    #[error("No data channel available")]
    ChannelMissing,

    #[error("Timeout waiting for data connection on {0}")]
    ConnectTimeout(SocketAddr),

    #[error("Failed to connect to {0}: {1}")]
    ConnectFailed(SocketAddr, io::Error),

    #[error("Failed to bind passive listener on {0}: {1}")]
    PassiveBindFailed(SocketAddr, io::Error),

    #[error("Timed out binding passive listener on {0}")]
    PassiveBindTimeout(SocketAddr),

    #[error("No available port for passive data connection")]
    NoAvailablePort,

    #[error("Data connection request was dropped before matching")]
    MatchCancelled,

    #[error("Data channel TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("Data channel I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage error during transfer: {0}")]
    Storage(#[from] StorageError),
}

/// Protocol-level failure of a command: an expected, recoverable outcome
/// that is reported to the client as a reply.
#[derive(Debug, Clone, Error)]
#[error("{code} {message}")]
pub struct FtpError {
    pub code: ReplyCode,
    pub message: String,
}

impl FtpError {
    pub fn new(code: ReplyCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_arguments(message: impl Into<String>) -> Self {
        Self::new(ReplyCode::ParameterSyntaxError, message)
    }

    pub fn bad_sequence(message: impl Into<String>) -> Self {
        Self::new(ReplyCode::BadCommandSequence, message)
    }

    pub fn not_logged_in() -> Self {
        Self::new(ReplyCode::NotLoggedIn, "Not logged in")
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ReplyCode::ParameterNotImplemented, message)
    }

    pub fn cant_open_data(message: impl Into<String>) -> Self {
        Self::new(ReplyCode::CantOpenDataConnection, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ReplyCode::ConnectionClosedTransferAborted, message)
    }

    pub fn to_reply(&self) -> Reply {
        Reply::new(self.code, self.message.clone())
    }
}

/// Failures that end the session: internal faults and transport faults.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Control channel desynchronized: {0}")]
    Codec(#[from] CodecError),

    #[error("Control channel security change failed: {0}")]
    Tls(#[from] TlsError),
}

impl SessionError {
    /// Whether the session can still attempt to write a farewell reply.
    pub fn is_internal(&self) -> bool {
        matches!(self, SessionError::Internal(_))
    }
}

/// Outcome of a failed command handler.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Reply(#[from] FtpError),

    #[error(transparent)]
    Fatal(#[from] SessionError),
}

/// Failures while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to bind control socket {0}: {1}")]
    Bind(String, io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
