//! Path validation
//!
//! Resolves client-supplied paths against the working directory and maps the
//! resulting virtual path under the server root.

use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Deepest virtual path a client may address.
pub const MAX_DIRECTORY_DEPTH: usize = 32;

/// Longest single path component accepted.
const MAX_COMPONENT_LENGTH: usize = 255;

/// Resolves `target` relative to `cwd` into a normalized absolute virtual path.
///
/// `.` and empty components are dropped and `..` pops a component. Climbing
/// above `/` is rejected as traversal.
pub fn resolve_virtual_path(cwd: &str, target: &str) -> Result<String, StorageError> {
    let target = target.trim();
    let mut components: Vec<&str> = Vec::new();
    if !target.starts_with('/') {
        components.extend(cwd.split('/').filter(|c| !c.is_empty() && *c != "."));
    }

    for component in target.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if components.pop().is_none() {
                    return Err(StorageError::PathTraversal(target.to_string()));
                }
            }
            name => {
                validate_component(name)?;
                components.push(name);
            }
        }
    }

    if components.len() > MAX_DIRECTORY_DEPTH {
        return Err(StorageError::InvalidPath(format!(
            "Path deeper than {MAX_DIRECTORY_DEPTH} levels"
        )));
    }

    Ok(format!("/{}", components.join("/")))
}

fn validate_component(name: &str) -> Result<(), StorageError> {
    if name.len() > MAX_COMPONENT_LENGTH {
        return Err(StorageError::InvalidPath("Path component too long".into()));
    }
    if name.chars().any(|c| c == '\0' || c == '\\' || c.is_control()) {
        return Err(StorageError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// Maps an absolute virtual path onto the real filesystem.
pub fn virtual_to_real_path(server_root: &Path, virtual_path: &str) -> PathBuf {
    let relative = virtual_path.trim_start_matches('/');
    if relative.is_empty() {
        server_root.to_path_buf()
    } else {
        server_root.join(relative)
    }
}

/// Parent of a virtual path; the root is its own parent.
pub fn parent_virtual_path(virtual_path: &str) -> String {
    match virtual_path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute_paths() {
        assert_eq!(resolve_virtual_path("/", "docs").unwrap(), "/docs");
        assert_eq!(resolve_virtual_path("/docs", "a/./b").unwrap(), "/docs/a/b");
        assert_eq!(resolve_virtual_path("/docs", "/etc").unwrap(), "/etc");
        assert_eq!(resolve_virtual_path("/docs/a", "..").unwrap(), "/docs");
        assert_eq!(resolve_virtual_path("/docs", "").unwrap(), "/docs");
    }

    #[test]
    fn rejects_traversal_above_root() {
        assert!(matches!(
            resolve_virtual_path("/", "../etc/passwd"),
            Err(StorageError::PathTraversal(_))
        ));
        assert!(matches!(
            resolve_virtual_path("/a", "../../b"),
            Err(StorageError::PathTraversal(_))
        ));
    }

    #[test]
    fn rejects_control_characters() {
        assert!(resolve_virtual_path("/", "bad\0name").is_err());
        assert!(resolve_virtual_path("/", "win\\style").is_err());
    }

    #[test]
    fn maps_under_root() {
        let root = Path::new("/srv/ftp");
        assert_eq!(virtual_to_real_path(root, "/"), PathBuf::from("/srv/ftp"));
        assert_eq!(
            virtual_to_real_path(root, "/a/b.txt"),
            PathBuf::from("/srv/ftp/a/b.txt")
        );
    }

    #[test]
    fn parent_paths() {
        assert_eq!(parent_virtual_path("/"), "/");
        assert_eq!(parent_virtual_path("/a"), "/");
        assert_eq!(parent_virtual_path("/a/b"), "/a");
    }
}
