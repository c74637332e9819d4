//! Resolve documents to files under a root directory

use crate::join_under;
use async_trait::async_trait;
use coedit_core::{DocumentId, Location, LocationResolver, StorageError};
use std::path::{Path, PathBuf};

/// Maps a document id to a path under `root`, treating `:` as the directory
/// separator: `alice:project:notes.txt` resolves to
/// `<root>/alice/project/notes.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &DocumentId) -> Result<PathBuf, StorageError> {
        join_under(&self.root, id.as_str().split(':'))
    }
}

#[async_trait]
impl LocationResolver for DirectoryResolver {
    async fn resolve(&self, id: &DocumentId) -> Result<Location, StorageError> {
        let path = self.path_for(id)?;
        Ok(Location::new(path.to_string_lossy()))
    }
}
