//! File system storage
//!
//! The storage traits used by transfers and file verbs, the local disk
//! implementation and path validation.

pub mod filesystem;
pub mod local;
pub mod validation;

pub use filesystem::{FileSystem, FtpFile, Listing};
pub use local::LocalFileSystem;
pub use validation::{MAX_DIRECTORY_DEPTH, resolve_virtual_path, virtual_to_real_path};
