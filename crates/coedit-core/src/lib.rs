//! coedit Core - Document Synchronization Engine
//!
//! This crate provides the correctness-critical part of coedit:
//! - A rope-backed sequence buffer holding live document content
//! - The confirmed operation log and its logical clock
//! - Operational transform of concurrently submitted edits
//! - Per-document sessions with presence, and the session registry

pub mod buffer;
pub mod config;
pub mod error;
pub mod id;
pub mod manager;
pub mod operation;
pub mod session;
pub mod state;
pub mod storage;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::Buffer;
pub use config::{EngineConfig, TransformWindow};
pub use error::{Error, Result};
pub use id::{DocumentId, UserId};
pub use manager::{ManagerStats, SessionManager};
pub use operation::{ConfirmedOp, Operation, PresenceUpdate, PullResult};
pub use session::{Presence, PushSummary, Session, PULL_BATCH_LIMIT};
pub use state::DocumentState;
pub use storage::{ContentStore, Location, LocationResolver, StorageError};
pub use transform::transform;
