//! File system abstraction
//!
//! The traits the transfer executor and the verb handlers use to reach
//! storage. Paths are absolute virtual paths already resolved against the
//! session's working directory.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

/// Formatted directory listing produced for LIST/NLST.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub path: String,
    pub lines: Vec<String>,
    /// False when enumeration stopped early; the transfer is then reported as failed.
    pub complete: bool,
}

impl Listing {
    pub fn new(path: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            path: path.into(),
            lines,
            complete: true,
        }
    }
}

/// An open file taking part in a transfer.
#[async_trait]
pub trait FtpFile: Send {
    /// Reads up to `max` bytes. `None` marks end of file.
    async fn read_block(&mut self, max: usize) -> Result<Option<Bytes>, StorageError>;

    async fn write_block(&mut self, data: &[u8]) -> Result<(), StorageError>;

    /// Flushes pending writes and releases the handle.
    async fn close(&mut self) -> Result<(), StorageError>;

    /// True while a retrieve still has unread content.
    fn is_reading(&self) -> bool;

    fn path(&self) -> &str;

    fn bytes_transferred(&self) -> u64;
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn open_read(&self, path: &str, offset: u64) -> Result<Box<dyn FtpFile>, StorageError>;

    async fn open_write(
        &self,
        path: &str,
        append: bool,
        offset: u64,
    ) -> Result<Box<dyn FtpFile>, StorageError>;

    async fn list(&self, path: &str, names_only: bool) -> Result<Listing, StorageError>;

    async fn size(&self, path: &str) -> Result<u64, StorageError>;

    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    async fn make_dir(&self, path: &str) -> Result<(), StorageError>;

    async fn remove_dir(&self, path: &str) -> Result<(), StorageError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Checks that `path` is an existing directory the session may enter.
    async fn change_dir(&self, path: &str) -> Result<(), StorageError>;

    async fn exists(&self, path: &str) -> bool;
}
