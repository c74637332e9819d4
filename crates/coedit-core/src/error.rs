//! Error types for coedit Core

use crate::storage::StorageError;
use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Position {position} out of range for buffer of length {len}")]
    OutOfRange { position: usize, len: usize },

    #[error("Unknown user {user} on document {document}")]
    UnknownUser { user: String, document: String },

    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for coedit Core operations
pub type Result<T> = std::result::Result<T, Error>;
