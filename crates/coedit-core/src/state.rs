//! Document state: live buffer, confirmed log and persistence bookkeeping

use crate::buffer::Buffer;
use crate::error::Result;
use crate::id::{DocumentId, UserId};
use crate::operation::{ConfirmedOp, Operation};
use crate::storage::{ContentStore, Location};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Server-side state of one document under edit.
///
/// The logical clock is the length of the confirmed log. Every committed
/// edit is stamped with the clock before being appended, so timestamps equal
/// log indices and are never reused. Replaying the confirmed log from the
/// initial content reproduces the buffer.
pub struct DocumentState {
    id: DocumentId,
    location: Location,
    store: Arc<dyn ContentStore>,
    buffer: Buffer,
    log: Vec<ConfirmedOp>,
    /// Edits applied since the last checkpoint
    pending: Vec<ConfirmedOp>,
    /// Content the pending edits were applied on top of
    checkpoint: String,
    /// Buffer holds changes not yet written to the store
    dirty: bool,
    flush_task: Option<JoinHandle<()>>,
}

impl DocumentState {
    /// Build state from content read from the backing store. `\r\n` line
    /// endings are normalized to `\n`.
    pub fn new(
        id: DocumentId,
        location: Location,
        store: Arc<dyn ContentStore>,
        initial: &str,
    ) -> Self {
        let content = initial.replace("\r\n", "\n");

        Self {
            id,
            location,
            store,
            buffer: Buffer::from_text(&content),
            log: Vec::new(),
            pending: Vec::new(),
            checkpoint: content,
            dirty: false,
            flush_task: None,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Logical clock: number of confirmed edits
    pub fn current_clock(&self) -> u64 {
        self.log.len() as u64
    }

    /// Current content as text
    pub fn snapshot(&self) -> String {
        self.buffer.to_string()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// All confirmed edits in commit order
    pub fn confirmed_log(&self) -> &[ConfirmedOp] {
        &self.log
    }

    /// Confirmed edits with `timestamp >= from`
    pub fn reference_log(&self, from: u64) -> &[ConfirmedOp] {
        let start = usize::try_from(from).map_or(self.log.len(), |f| f.min(self.log.len()));
        &self.log[start..]
    }

    /// Edits applied since the last checkpoint
    pub fn pending(&self) -> &[ConfirmedOp] {
        &self.pending
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Apply an edit and append it to the confirmed log.
    ///
    /// Returns the assigned timestamp, or `None` for a reposition, which has no
    /// content effect. An out-of-range position fails with
    /// [`crate::Error::OutOfRange`] and leaves buffer, log and clock untouched.
    pub fn commit(&mut self, op: Operation, user: &UserId) -> Result<Option<u64>> {
        if !op.is_edit() {
            return Ok(None);
        }

        apply(&mut self.buffer, op)?;

        let timestamp = self.current_clock();
        let confirmed = ConfirmedOp {
            op,
            timestamp,
            user: user.clone(),
        };
        self.pending.push(confirmed.clone());
        self.log.push(confirmed);
        self.dirty = true;

        Ok(Some(timestamp))
    }

    /// Replay pending edits on top of the checkpoint and adopt the result if
    /// it disagrees with the live buffer, then start a new checkpoint.
    ///
    /// Returns `true` if the buffer had diverged.
    pub fn reconcile(&mut self) -> bool {
        let mut rebuilt = Buffer::from_text(&self.checkpoint);
        for entry in &self.pending {
            if let Err(e) = apply(&mut rebuilt, entry.op) {
                warn!(doc_id = %self.id, timestamp = entry.timestamp, error = %e, "Pending edit no longer applies");
            }
        }

        let rebuilt = rebuilt.to_string();
        let diverged = rebuilt != self.snapshot();
        if diverged {
            warn!(doc_id = %self.id, pending = self.pending.len(), "Buffer diverged from pending edits, rebuilding");
            self.buffer = Buffer::from_text(&rebuilt);
            self.dirty = true;
        }

        self.checkpoint = rebuilt;
        self.pending.clear();
        diverged
    }

    /// Write the full buffer to the backing store and clear pending edits.
    ///
    /// Returns the number of pending edits made durable. On failure nothing is
    /// cleared, so the next flush retries.
    pub async fn flush(&mut self) -> Result<usize> {
        let content = self.snapshot();
        self.store.write(&self.location, &content).await?;

        let flushed = self.pending.len();
        self.checkpoint = content;
        self.pending.clear();
        self.dirty = false;

        debug!(doc_id = %self.id, location = %self.location, flushed, "Document flushed");
        Ok(flushed)
    }

    /// Hand over the background flush task so teardown can cancel it
    pub fn attach_flush_task(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.flush_task.replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the background flush and perform one final flush
    pub async fn teardown(&mut self) {
        if let Some(handle) = self.flush_task.take() {
            handle.abort();
        }

        match self.flush().await {
            Ok(flushed) => info!(doc_id = %self.id, flushed, clock = self.current_clock(), "Document state torn down"),
            Err(e) => warn!(doc_id = %self.id, error = %e, "Final flush failed"),
        }
    }
}

impl Drop for DocumentState {
    fn drop(&mut self) {
        if let Some(handle) = self.flush_task.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentState")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("clock", &self.log.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn apply(buffer: &mut Buffer, op: Operation) -> Result<()> {
    match op {
        Operation::Insert {
            position,
            character,
        } => {
            let mut encoded = [0u8; 4];
            buffer.insert(position, character.encode_utf8(&mut encoded))
        }
        Operation::Erase { position } => buffer.erase(position).map(|_| ()),
        Operation::Reposition { .. } => Ok(()),
    }
}
