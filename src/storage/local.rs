//! Local file system
//!
//! `FileSystem` backed by a directory on disk. Virtual `/` maps to the server
//! root; nothing outside it is reachable, symlinks included.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::StorageError;
use crate::storage::filesystem::{FileSystem, FtpFile, Listing};
use crate::storage::validation::virtual_to_real_path;

pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn real(&self, virtual_path: &str) -> PathBuf {
        virtual_to_real_path(&self.root, virtual_path)
    }

    /// Resolves symlinks of an existing path and checks it stays under the root.
    async fn ensure_within_root(&self, real: &Path, virtual_path: &str) -> Result<(), StorageError> {
        let canonical = fs::canonicalize(real)
            .await
            .map_err(|e| not_found_or_io(e, virtual_path))?;
        let root = fs::canonicalize(&self.root)
            .await
            .map_err(|_| StorageError::InvalidPath("Server root invalid".into()))?;
        if !canonical.starts_with(&root) {
            warn!("Path {virtual_path} resolves outside the server root");
            return Err(StorageError::PathTraversal(virtual_path.to_string()));
        }
        Ok(())
    }

    async fn ensure_parent_dir(&self, real: &Path, virtual_path: &str) -> Result<(), StorageError> {
        let parent = real
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(virtual_path.to_string()))?;
        match fs::metadata(parent).await {
            Ok(meta) if meta.is_dir() => self.ensure_within_root(parent, virtual_path).await,
            Ok(_) => Err(StorageError::NotADirectory(virtual_path.to_string())),
            Err(_) => Err(StorageError::DirectoryNotFound(virtual_path.to_string())),
        }
    }
}

fn not_found_or_io(err: std::io::Error, virtual_path: &str) -> StorageError {
    match err.kind() {
        std::io::ErrorKind::NotFound => StorageError::FileNotFound(virtual_path.to_string()),
        std::io::ErrorKind::PermissionDenied => {
            StorageError::PermissionDenied(virtual_path.to_string())
        }
        _ => StorageError::Io(err),
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn open_read(&self, path: &str, offset: u64) -> Result<Box<dyn FtpFile>, StorageError> {
        let real = self.real(path);
        let meta = fs::metadata(&real)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        if !meta.is_file() {
            return Err(StorageError::NotAFile(path.to_string()));
        }
        self.ensure_within_root(&real, path).await?;

        let mut file = File::open(&real)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        info!("Opened {path} for reading at offset {offset} (real: {})", real.display());
        Ok(Box::new(LocalFile::reader(path, file)))
    }

    async fn open_write(
        &self,
        path: &str,
        append: bool,
        offset: u64,
    ) -> Result<Box<dyn FtpFile>, StorageError> {
        let real = self.real(path);
        self.ensure_parent_dir(&real, path).await?;
        if let Ok(meta) = fs::metadata(&real).await {
            if meta.is_dir() {
                return Err(StorageError::NotAFile(path.to_string()));
            }
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else if offset > 0 {
            options.write(true);
        } else {
            options.write(true).truncate(true);
        }
        let mut file = options
            .open(&real)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        if !append && offset > 0 {
            file.set_len(offset).await?;
            file.seek(SeekFrom::Start(offset)).await?;
        }
        info!(
            "Opened {path} for writing (append: {append}, offset: {offset}, real: {})",
            real.display()
        );
        Ok(Box::new(LocalFile::writer(path, file)))
    }

    async fn list(&self, path: &str, names_only: bool) -> Result<Listing, StorageError> {
        let real = self.real(path);
        let meta = fs::metadata(&real)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        self.ensure_within_root(&real, path).await?;

        if meta.is_file() {
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            let line = if names_only {
                name
            } else {
                format_long_entry(&name, &meta)
            };
            return Ok(Listing::new(path, vec![line]));
        }

        let mut entries = fs::read_dir(&real)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        let mut rows: Vec<(String, String)> = Vec::new();
        let mut complete = true;
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let line = if names_only {
                        name.clone()
                    } else {
                        match entry.metadata().await {
                            Ok(meta) => format_long_entry(&name, &meta),
                            Err(e) => {
                                debug!("Skipping metadata for {name}: {e}");
                                format!("?--------- 1 ftp ftp {:>12} {} {name}", 0, "Jan 01 00:00")
                            }
                        }
                    };
                    rows.push((name, line));
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Listing of {path} interrupted: {e}");
                    complete = false;
                    break;
                }
            }
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        info!("Listed directory {path} (real: {}) - {} entries", real.display(), rows.len());
        Ok(Listing {
            path: path.to_string(),
            lines: rows.into_iter().map(|(_, line)| line).collect(),
            complete,
        })
    }

    async fn size(&self, path: &str) -> Result<u64, StorageError> {
        let meta = fs::metadata(self.real(path))
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        if !meta.is_file() {
            return Err(StorageError::NotAFile(path.to_string()));
        }
        Ok(meta.len())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let real = self.real(path);
        let meta = fs::metadata(&real)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        if !meta.is_file() {
            return Err(StorageError::NotAFile(path.to_string()));
        }
        self.ensure_within_root(&real, path).await?;
        fs::remove_file(&real)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        info!("Deleted file {path} (real: {})", real.display());
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> Result<(), StorageError> {
        let real = self.real(path);
        if fs::metadata(&real).await.is_ok() {
            return Err(StorageError::FileAlreadyExists(path.to_string()));
        }
        self.ensure_parent_dir(&real, path).await?;
        fs::create_dir(&real)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        info!("Created directory {path} (real: {})", real.display());
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<(), StorageError> {
        if path == "/" {
            return Err(StorageError::PermissionDenied(path.to_string()));
        }
        let real = self.real(path);
        let meta = fs::metadata(&real)
            .await
            .map_err(|_| StorageError::DirectoryNotFound(path.to_string()))?;
        if !meta.is_dir() {
            return Err(StorageError::NotADirectory(path.to_string()));
        }
        self.ensure_within_root(&real, path).await?;
        fs::remove_dir(&real)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        info!("Removed directory {path} (real: {})", real.display());
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let real_from = self.real(from);
        let real_to = self.real(to);
        self.ensure_within_root(&real_from, from).await?;
        self.ensure_parent_dir(&real_to, to).await?;
        if fs::metadata(&real_to).await.is_ok() {
            return Err(StorageError::FileAlreadyExists(to.to_string()));
        }
        fs::rename(&real_from, &real_to)
            .await
            .map_err(|e| not_found_or_io(e, from))?;
        info!("Renamed {from} to {to}");
        Ok(())
    }

    async fn change_dir(&self, path: &str) -> Result<(), StorageError> {
        let real = self.real(path);
        let meta = fs::metadata(&real)
            .await
            .map_err(|_| StorageError::DirectoryNotFound(path.to_string()))?;
        if !meta.is_dir() {
            return Err(StorageError::NotADirectory(path.to_string()));
        }
        self.ensure_within_root(&real, path).await
    }

    async fn exists(&self, path: &str) -> bool {
        fs::metadata(self.real(path)).await.is_ok()
    }
}

/// `ls -l` style line.
fn format_long_entry(name: &str, meta: &std::fs::Metadata) -> String {
    let (kind, perms) = if meta.is_dir() {
        ('d', "rwxr-xr-x")
    } else if meta.permissions().readonly() {
        ('-', "r--r--r--")
    } else {
        ('-', "rw-r--r--")
    };
    let size = if meta.is_dir() { 0 } else { meta.len() };
    let modified: DateTime<Utc> = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH).into();
    format!(
        "{kind}{perms} 1 ftp ftp {size:>12} {} {name}",
        modified.format("%b %d %H:%M")
    )
}

/// A file opened for a single transfer.
pub struct LocalFile {
    path: String,
    file: File,
    reading: bool,
    transferred: u64,
}

impl LocalFile {
    fn reader(path: &str, file: File) -> Self {
        Self {
            path: path.to_string(),
            file,
            reading: true,
            transferred: 0,
        }
    }

    fn writer(path: &str, file: File) -> Self {
        Self {
            path: path.to_string(),
            file,
            reading: false,
            transferred: 0,
        }
    }
}

#[async_trait]
impl FtpFile for LocalFile {
    async fn read_block(&mut self, max: usize) -> Result<Option<Bytes>, StorageError> {
        let mut buf = BytesMut::with_capacity(max);
        let read = self.file.read_buf(&mut buf).await?;
        if read == 0 {
            self.reading = false;
            return Ok(None);
        }
        self.transferred += read as u64;
        Ok(Some(buf.freeze()))
    }

    async fn write_block(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(data).await?;
        self.transferred += data.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.file.flush().await?;
        Ok(())
    }

    fn is_reading(&self) -> bool {
        self.reading
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn bytes_transferred(&self) -> u64 {
        self.transferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalFileSystem) {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path());
        (dir, fs)
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let (_dir, fs) = setup();
        let mut file = fs.open_write("/a.txt", false, 0).await.unwrap();
        file.write_block(b"hello ").await.unwrap();
        file.write_block(b"world").await.unwrap();
        file.close().await.unwrap();

        let mut file = fs.open_read("/a.txt", 6).await.unwrap();
        assert!(file.is_reading());
        let block = file.read_block(1024).await.unwrap().unwrap();
        assert_eq!(&block[..], b"world");
        assert!(file.read_block(1024).await.unwrap().is_none());
        assert!(!file.is_reading());
        assert_eq!(fs.size("/a.txt").await.unwrap(), 11);
    }

    #[tokio::test]
    async fn append_and_restart_offsets() {
        let (_dir, fs) = setup();
        let mut file = fs.open_write("/b.bin", false, 0).await.unwrap();
        file.write_block(b"0123456789").await.unwrap();
        file.close().await.unwrap();

        let mut file = fs.open_write("/b.bin", true, 0).await.unwrap();
        file.write_block(b"AB").await.unwrap();
        file.close().await.unwrap();
        assert_eq!(fs.size("/b.bin").await.unwrap(), 12);

        let mut file = fs.open_write("/b.bin", false, 4).await.unwrap();
        file.write_block(b"xy").await.unwrap();
        file.close().await.unwrap();
        let content = std::fs::read(fs.root().join("b.bin")).unwrap();
        assert_eq!(&content[..], b"0123xy");
    }

    #[tokio::test]
    async fn listing_is_sorted_and_complete() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("b.txt"), b"bb").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let names = fs.list("/", true).await.unwrap();
        assert!(names.complete);
        assert_eq!(names.lines, vec!["a.txt", "b.txt", "sub"]);

        let long = fs.list("/", false).await.unwrap();
        assert!(long.lines[2].starts_with('d'));
        assert!(long.lines[0].ends_with(" a.txt"));
    }

    #[tokio::test]
    async fn directory_operations() {
        let (_dir, fs) = setup();
        fs.make_dir("/docs").await.unwrap();
        assert!(matches!(
            fs.make_dir("/docs").await,
            Err(StorageError::FileAlreadyExists(_))
        ));
        fs.change_dir("/docs").await.unwrap();
        assert!(fs.change_dir("/missing").await.is_err());

        let mut file = fs.open_write("/docs/x", false, 0).await.unwrap();
        file.close().await.unwrap();
        fs.rename("/docs/x", "/docs/y").await.unwrap();
        assert!(fs.exists("/docs/y").await);
        fs.delete("/docs/y").await.unwrap();
        fs.remove_dir("/docs").await.unwrap();
        assert!(!fs.exists("/docs").await);
    }

    #[tokio::test]
    async fn missing_parent_is_reported() {
        let (_dir, fs) = setup();
        assert!(matches!(
            fs.open_write("/nope/file", false, 0).await,
            Err(StorageError::DirectoryNotFound(_))
        ));
        assert!(matches!(
            fs.open_read("/nope", 0).await,
            Err(StorageError::FileNotFound(_))
        ));
    }
}
