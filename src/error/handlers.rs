//! Error handlers
//!
//! Converts domain errors into the FTP reply a client should see.

use log::{debug, warn};

use crate::error::types::{
    AddressError, AuthError, CommandError, FtpError, StorageError, TransferError,
};
use crate::protocol::responses::ReplyCode;

impl From<StorageError> for FtpError {
    fn from(err: StorageError) -> Self {
        debug!("Storage error mapped to reply: {err}");
        let code = match &err {
            StorageError::FileNotFound(_)
            | StorageError::DirectoryNotFound(_)
            | StorageError::NotADirectory(_)
            | StorageError::NotAFile(_)
            | StorageError::PermissionDenied(_) => ReplyCode::FileUnavailable,
            StorageError::FileAlreadyExists(_)
            | StorageError::InvalidPath(_)
            | StorageError::PathTraversal(_) => ReplyCode::FileNameNotAllowed,
            StorageError::Io(_) => ReplyCode::FileActionNotTaken,
        };
        let message = match &err {
            StorageError::Io(_) => "Requested file action not taken".to_string(),
            other => other.to_string(),
        };
        FtpError::new(code, message)
    }
}

impl From<AuthError> for FtpError {
    fn from(err: AuthError) -> Self {
        debug!("Authentication error mapped to reply: {err}");
        match err {
            AuthError::MalformedInput(_) => FtpError::bad_arguments("Malformed login input"),
            AuthError::InvalidState(msg) => FtpError::bad_sequence(msg),
            AuthError::InvalidUsername(_) | AuthError::UserNotFound(_) => {
                FtpError::new(ReplyCode::NotLoggedIn, "Invalid username")
            }
            AuthError::InvalidPassword(_) => {
                FtpError::new(ReplyCode::NotLoggedIn, "Invalid password")
            }
            AuthError::InvalidAccount(_) => {
                FtpError::new(ReplyCode::NotLoggedIn, "Invalid account")
            }
        }
    }
}

impl From<AddressError> for FtpError {
    fn from(err: AddressError) -> Self {
        match err {
            AddressError::UnsupportedFamily(_) => FtpError::new(
                ReplyCode::ParameterNotImplemented,
                "Network protocol not supported, use (1,2)",
            ),
            other => FtpError::bad_arguments(other.to_string()),
        }
    }
}

impl From<TransferError> for FtpError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Busy => FtpError::bad_sequence("Previous transfer not finished"),
            TransferError::NotConfigured => FtpError::bad_sequence("Use PORT or PASV first"),
            TransferError::ChannelStillOpen => FtpError::aborted("Connection closed; transfer aborted"),
            TransferError::Storage(e) => e.into(),
            other => {
                warn!("Data connection failure: {other}");
                FtpError::cant_open_data("Can't open data connection")
            }
        }
    }
}

impl From<StorageError> for CommandError {
    fn from(err: StorageError) -> Self {
        CommandError::Reply(err.into())
    }
}

impl From<AuthError> for CommandError {
    fn from(err: AuthError) -> Self {
        CommandError::Reply(err.into())
    }
}

impl From<AddressError> for CommandError {
    fn from(err: AddressError) -> Self {
        CommandError::Reply(err.into())
    }
}

impl From<TransferError> for CommandError {
    fn from(err: TransferError) -> Self {
        CommandError::Reply(err.into())
    }
}
