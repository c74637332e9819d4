//! Backing-store interfaces
//!
//! The engine never touches disks or databases directly. A [`LocationResolver`]
//! maps a document to where its content lives, and a [`ContentStore`] reads
//! initial content and accepts full-content flushes. Implementations live in
//! `coedit-storage`.

use crate::id::DocumentId;
use async_trait::async_trait;
use std::path::Path;

/// Opaque backing location of one document's content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves a document id to its backing location
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve(&self, id: &DocumentId) -> Result<Location, StorageError>;
}

/// Reads and overwrites plain-text document content
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read the full content at `location`
    async fn read(&self, location: &Location) -> Result<String, StorageError>;

    /// Replace the full content at `location`
    async fn write(&self, location: &Location, content: &str) -> Result<(), StorageError>;
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),
}
