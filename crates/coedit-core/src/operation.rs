//! Edit operations and their wire representations

use crate::id::UserId;
use serde::{Deserialize, Serialize};

/// A single edit submitted by a client.
///
/// Serialized as `{"type":"INSERT","position":5,"character":"!"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Insert one character before `position`
    Insert { position: usize, character: char },
    /// Erase the character at `position`
    Erase { position: usize },
    /// Move the submitter's cursor; no content effect
    Reposition { position: usize },
}

impl Operation {
    pub fn insert(position: usize, character: char) -> Self {
        Operation::Insert {
            position,
            character,
        }
    }

    pub fn erase(position: usize) -> Self {
        Operation::Erase { position }
    }

    pub fn reposition(position: usize) -> Self {
        Operation::Reposition { position }
    }

    pub fn position(&self) -> usize {
        match *self {
            Operation::Insert { position, .. }
            | Operation::Erase { position }
            | Operation::Reposition { position } => position,
        }
    }

    /// Same operation targeting a different position
    pub fn with_position(self, position: usize) -> Self {
        match self {
            Operation::Insert { character, .. } => Operation::Insert {
                position,
                character,
            },
            Operation::Erase { .. } => Operation::Erase { position },
            Operation::Reposition { .. } => Operation::Reposition { position },
        }
    }

    /// Whether the operation changes buffer content
    pub fn is_edit(&self) -> bool {
        !matches!(self, Operation::Reposition { .. })
    }
}

/// An operation accepted into the confirmed log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedOp {
    #[serde(flatten)]
    pub op: Operation,
    /// Logical clock at commit; equals the entry's log index
    pub timestamp: u64,
    #[serde(rename = "userId")]
    pub user: UserId,
}

/// Presence heartbeat returned by a pull with nothing new to deliver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "REPOSITION")]
pub struct PresenceUpdate {
    #[serde(rename = "userId")]
    pub user: UserId,
    pub timestamp: u64,
    pub position: usize,
}

/// Outcome of a pull: either pending log entries or a presence heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PullResult {
    Delta(Vec<ConfirmedOp>),
    Presence(Vec<PresenceUpdate>),
}

impl PullResult {
    pub fn len(&self) -> usize {
        match self {
            PullResult::Delta(ops) => ops.len(),
            PullResult::Presence(updates) => updates.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
