//! Plain-text file backing store

use async_trait::async_trait;
use coedit_core::{ContentStore, Location, StorageError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores each document as one plain-text file at its resolved path.
///
/// Every write replaces the whole file: content goes to a sibling temp file
/// that is then renamed over the target. A missing file reads as an empty
/// document and is created by the first write.
#[derive(Debug, Clone, Default)]
pub struct FileStore;

impl FileStore {
    pub fn new() -> Self {
        Self
    }
}

fn temp_path(path: &Path) -> Result<PathBuf, StorageError> {
    let name = path
        .file_name()
        .ok_or_else(|| StorageError::InvalidLocation(path.display().to_string()))?;
    let mut temp = std::ffi::OsString::from(".");
    temp.push(name);
    temp.push(".tmp");
    Ok(path.with_file_name(temp))
}

fn io_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Io(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl ContentStore for FileStore {
    async fn read(&self, location: &Location) -> Result<String, StorageError> {
        let path = location.as_path();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No backing file yet, starting empty");
                Ok(String::new())
            }
            Err(e) => Err(io_error(path, e)),
        }
    }

    async fn write(&self, location: &Location, content: &str) -> Result<(), StorageError> {
        let path = location.as_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let temp = temp_path(path)?;
        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| io_error(&temp, e))?;
        tokio::fs::rename(&temp, path)
            .await
            .map_err(|e| io_error(path, e))?;
        Ok(())
    }
}
