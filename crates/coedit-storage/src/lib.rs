//! coedit Storage Backends
//!
//! Implementations of the core backing-store traits:
//! - Memory (default): volatile content, identity resolution
//! - File (default): one plain-text file per document, fully rewritten on flush
//! - SQLite catalog: resolves documents through a file catalog table

pub mod memory;
#[cfg(feature = "file")]
pub mod file;
#[cfg(feature = "file")]
pub mod resolver;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "file", feature = "sqlite"))]
use coedit_core::StorageError;
#[cfg(any(feature = "file", feature = "sqlite"))]
use std::path::{Component, Path, PathBuf};

/// Join `segments` onto `root`, refusing anything that could escape it
#[cfg(any(feature = "file", feature = "sqlite"))]
pub(crate) fn join_under<'a>(
    root: &Path,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<PathBuf, StorageError> {
    let mut path = root.to_path_buf();
    let mut depth = 0;

    for segment in segments {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => path.push(part),
            _ => {
                return Err(StorageError::InvalidLocation(format!(
                    "invalid path segment {:?}",
                    segment
                )))
            }
        }
        depth += 1;
    }

    if depth == 0 {
        return Err(StorageError::InvalidLocation("empty path".into()));
    }
    Ok(path)
}

pub use memory::MemoryStore;
#[cfg(feature = "file")]
pub use file::FileStore;
#[cfg(feature = "file")]
pub use resolver::DirectoryResolver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCatalog;

#[cfg(all(test, feature = "file"))]
mod tests {
    use super::*;

    #[test]
    fn test_join_under_rejects_escapes() {
        let root = Path::new("/srv/docs");

        assert_eq!(
            join_under(root, ["alice", "notes.txt"]).unwrap(),
            PathBuf::from("/srv/docs/alice/notes.txt")
        );
        assert!(join_under(root, ["..", "etc"]).is_err());
        assert!(join_under(root, ["alice", ""]).is_err());
        assert!(join_under(root, ["."]).is_err());
        assert!(join_under(root, ["a/b"]).is_err());
        assert!(join_under(root, std::iter::empty()).is_err());
    }
}
