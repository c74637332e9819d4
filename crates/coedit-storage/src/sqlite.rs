//! SQLite file catalog resolver
//!
//! Project and file-tree management records every editable file in a
//! catalog: a dotted directory path (`alice.project.src`) plus a file name.
//! This resolver answers `resolve(docId)` from that table.

use crate::join_under;
use async_trait::async_trait;
use coedit_core::{DocumentId, Location, LocationResolver, StorageError};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Resolves documents through a `files` catalog table
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    root: PathBuf,
}

impl SqliteCatalog {
    /// Open (or create) the catalog database at `path`; files live under `root`
    pub fn new(path: impl AsRef<Path>, root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::Database(e.to_string()))?;
        Self::with_connection(conn, root.into())
    }

    /// Create an in-memory catalog (for testing)
    pub fn in_memory(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::Database(e.to_string()))?;
        Self::with_connection(conn, root.into())
    }

    fn with_connection(conn: Connection, root: PathBuf) -> Result<Self, StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                file_name TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            root,
        })
    }

    /// Record where a document's file lives, replacing any previous entry
    pub fn add_file(&self, id: &DocumentId, path: &str, file_name: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO files (id, path, file_name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                file_name = excluded.file_name
            "#,
            params![id.as_str(), path, file_name],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn remove_file(&self, id: &DocumentId) -> Result<bool, StorageError> {
        let conn = self.conn.lock();
        let affected = conn
            .execute("DELETE FROM files WHERE id = ?1", params![id.as_str()])
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(affected > 0)
    }

    pub fn file_count(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(|e| StorageError::Database(e.to_string()))
    }
}

#[async_trait]
impl LocationResolver for SqliteCatalog {
    async fn resolve(&self, id: &DocumentId) -> Result<Location, StorageError> {
        let entry: Option<(String, String)> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT path, file_name FROM files WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?
        };

        let (path, file_name) = entry.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let full = join_under(
            &self.root,
            path.split('.').chain(std::iter::once(file_name.as_str())),
        )?;
        Ok(Location::new(full.to_string_lossy()))
    }
}
