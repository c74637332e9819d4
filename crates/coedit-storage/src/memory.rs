//! In-memory backing store

use async_trait::async_trait;
use coedit_core::{ContentStore, DocumentId, Location, LocationResolver, StorageError};
use dashmap::DashMap;

/// In-memory backing store
///
/// Fast, volatile storage suitable for development and tests. Content is
/// lost when the process exits. Also acts as its own resolver: a document's
/// location is its id.
pub struct MemoryStore {
    /// Content by location
    data: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Content currently held at `location`
    pub fn get(&self, location: &str) -> Option<String> {
        self.data.get(location).map(|entry| entry.value().clone())
    }

    /// Replace the content held at `location`
    pub fn put(&self, location: impl Into<String>, content: impl Into<String>) {
        self.data.insert(location.into(), content.into());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    /// Unknown locations read as empty documents
    async fn read(&self, location: &Location) -> Result<String, StorageError> {
        Ok(self.get(location.as_str()).unwrap_or_default())
    }

    async fn write(&self, location: &Location, content: &str) -> Result<(), StorageError> {
        self.put(location.as_str(), content);
        Ok(())
    }
}

#[async_trait]
impl LocationResolver for MemoryStore {
    async fn resolve(&self, id: &DocumentId) -> Result<Location, StorageError> {
        Ok(Location::new(id.as_str()))
    }
}
