//! Protocol error types

use thiserror::Error;

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Core error: {0}")]
    Core(#[from] coedit_core::Error),
}

impl ProtocolError {
    /// Error code reported to the client in `-ERR <code> <message>`
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Core(
                coedit_core::Error::InvalidDocumentId(_) | coedit_core::Error::InvalidUserId(_),
            ) => "INVALID_ID",
            _ => "PARSE_ERROR",
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
