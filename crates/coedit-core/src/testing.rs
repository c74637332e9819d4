//! In-crate test doubles for the backing-store traits

use crate::id::DocumentId;
use crate::storage::{ContentStore, Location, LocationResolver, StorageError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Store that keeps content in memory and counts writes.
///
/// Also resolves `<id>` to location `<id>.txt`; ids starting with `missing`
/// do not resolve.
#[derive(Default)]
pub struct RecordingStore {
    files: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, location: &str, content: &str) {
        self.files.lock().insert(location.to_string(), content.to_string());
    }

    pub fn content(&self, location: &str) -> Option<String> {
        self.files.lock().get(location).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for RecordingStore {
    async fn read(&self, location: &Location) -> Result<String, StorageError> {
        Ok(self.content(location.as_str()).unwrap_or_default())
    }

    async fn write(&self, location: &Location, content: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io("disk full".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.seed(location.as_str(), content);
        Ok(())
    }
}

#[async_trait]
impl LocationResolver for RecordingStore {
    async fn resolve(&self, id: &DocumentId) -> Result<Location, StorageError> {
        if id.as_str().starts_with("missing") {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(Location::new(format!("{}.txt", id)))
    }
}
