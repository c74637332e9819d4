//! Per-document session: document state plus presence of editing users

use crate::config::TransformWindow;
use crate::error::{Error, Result};
use crate::id::UserId;
use crate::operation::{ConfirmedOp, Operation, PresenceUpdate, PullResult};
use crate::state::DocumentState;
use crate::transform::{reference_window, transform};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Maximum confirmed entries returned by a single pull
pub const PULL_BATCH_LIMIT: usize = 10;

/// Presence record of one registered user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub cursor: usize,
    /// Clock of the first confirmed entry this user has not pulled yet
    pub last_synced: u64,
}

/// What a push did, for logging and tests. Clients only get an ack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    pub committed: usize,
    pub dropped: usize,
    pub repositioned: usize,
}

/// Coordinates edits and pulls on one document
#[derive(Debug)]
pub struct Session {
    state: DocumentState,
    presence: HashMap<UserId, Presence>,
    window: TransformWindow,
}

impl Session {
    pub fn new(state: DocumentState, window: TransformWindow) -> Self {
        Self {
            state,
            presence: HashMap::new(),
            window,
        }
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut DocumentState {
        &mut self.state
    }

    /// Register `user` as synced up to the current clock with the cursor at
    /// the start. Re-adding an existing user resets its record.
    pub fn add_user(&mut self, user: UserId) {
        let record = Presence {
            cursor: 0,
            last_synced: self.state.current_clock(),
        };
        self.presence.insert(user, record);
    }

    pub fn remove_user(&mut self, user: &UserId) -> Result<()> {
        match self.presence.remove(user) {
            Some(_) => Ok(()),
            None => Err(self.unknown_user(user)),
        }
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.presence.contains_key(user)
    }

    pub fn presence(&self, user: &UserId) -> Option<&Presence> {
        self.presence.get(user)
    }

    pub fn user_count(&self) -> usize {
        self.presence.len()
    }

    /// Transform and apply `ops` in submission order.
    ///
    /// Repositions only move the submitter's cursor. Out-of-range edits are
    /// dropped and logged while the remaining edits still commit.
    pub fn handle_push<I>(&mut self, user: &UserId, ops: I) -> Result<PushSummary>
    where
        I: IntoIterator<Item = Operation>,
    {
        let since = match self.presence.get(user) {
            Some(record) => record.last_synced,
            None => return Err(self.unknown_user(user)),
        };

        let mut summary = PushSummary::default();
        for op in ops {
            let unseen = reference_window(self.state.confirmed_log(), since, user, self.window);
            let Some(transformed) = transform(op, unseen) else {
                warn!(doc_id = %self.state.id(), user = %user, ?op, "Dropping edit with unrepresentable position");
                summary.dropped += 1;
                continue;
            };

            if let Operation::Reposition { position } = transformed {
                if let Some(record) = self.presence.get_mut(user) {
                    record.cursor = position;
                }
                summary.repositioned += 1;
                continue;
            }

            match self.state.commit(transformed, user) {
                Ok(Some(timestamp)) => {
                    debug!(doc_id = %self.state.id(), user = %user, ?op, ?transformed, timestamp, "Edit committed");
                    summary.committed += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(doc_id = %self.state.id(), user = %user, ?transformed, error = %e, "Dropping edit");
                    summary.dropped += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Deliver up to [`PULL_BATCH_LIMIT`] confirmed entries the user has not
    /// seen yet, or a presence heartbeat when there are none.
    pub fn handle_pull(&mut self, user: &UserId) -> Result<PullResult> {
        let from = match self.presence.get(user) {
            Some(record) => record.last_synced,
            None => return Err(self.unknown_user(user)),
        };

        let batch: Vec<ConfirmedOp> = self
            .state
            .reference_log(from)
            .iter()
            .take(PULL_BATCH_LIMIT)
            .cloned()
            .collect();

        if let Some(last) = batch.last() {
            let next = last.timestamp + 1;
            if let Some(record) = self.presence.get_mut(user) {
                record.last_synced = next;
            }
            return Ok(PullResult::Delta(batch));
        }

        let clock = self.state.current_clock();
        let mut updates: Vec<PresenceUpdate> = self
            .presence
            .iter()
            .map(|(id, record)| PresenceUpdate {
                user: id.clone(),
                timestamp: clock,
                position: record.cursor,
            })
            .collect();
        updates.sort_by(|a, b| a.user.cmp(&b.user));

        Ok(PullResult::Presence(updates))
    }

    pub async fn teardown(&mut self) {
        self.state.teardown().await;
    }

    fn unknown_user(&self, user: &UserId) -> Error {
        Error::UnknownUser {
            user: user.to_string(),
            document: self.state.id().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::id::DocumentId;
    use crate::storage::Location;
    use crate::testing::RecordingStore;
    use std::sync::Arc;

    fn session_with(content: &str) -> Session {
        session_with_window(content, TransformWindow::SinceLastSync)
    }

    fn session_with_window(content: &str, window: TransformWindow) -> Session {
        let state = DocumentState::new(
            DocumentId::new("doc:1").unwrap(),
            Location::new("doc-1.txt"),
            Arc::new(RecordingStore::new()),
            content,
        );
        Session::new(state, window)
    }

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    #[test]
    fn test_add_user_starts_at_current_clock() {
        let mut session = session_with("abc");
        let alice = user("alice");
        session.add_user(alice.clone());
        session.handle_push(&alice, [Operation::insert(0, 'x')]).unwrap();

        session.add_user(user("bob"));
        let bob = session.presence(&user("bob")).unwrap();
        assert_eq!(bob.last_synced, 1);
        assert_eq!(bob.cursor, 0);
        assert_eq!(session.user_count(), 2);
    }

    #[test]
    fn test_remove_unknown_user_fails() {
        let mut session = session_with("");
        session.add_user(user("alice"));

        assert!(matches!(
            session.remove_user(&user("bob")),
            Err(Error::UnknownUser { .. })
        ));
        session.remove_user(&user("alice")).unwrap();
        assert_eq!(session.user_count(), 0);
    }

    #[test]
    fn test_concurrent_insert_then_erase() {
        let mut session = session_with("hello");
        let (alice, bob) = (user("alice"), user("bob"));
        session.add_user(alice.clone());
        session.add_user(bob.clone());

        session.handle_push(&alice, [Operation::insert(5, '!')]).unwrap();
        assert_eq!(session.state().snapshot(), "hello!");
        assert_eq!(session.state().current_clock(), 1);

        // bob has not pulled the insert; position 0 is unaffected by it
        session.handle_push(&bob, [Operation::erase(0)]).unwrap();
        assert_eq!(session.state().snapshot(), "ello!");
        assert_eq!(session.state().current_clock(), 2);
    }

    #[test]
    fn test_concurrent_inserts_at_same_position() {
        let mut session = session_with("ac");
        let (alice, bob) = (user("alice"), user("bob"));
        session.add_user(alice.clone());
        session.add_user(bob.clone());

        session.handle_push(&alice, [Operation::insert(1, 'b')]).unwrap();
        session.handle_push(&bob, [Operation::insert(1, 'x')]).unwrap();

        // the later insert lands after the earlier one
        assert_eq!(session.state().snapshot(), "abxc");
        assert_eq!(session.state().confirmed_log()[1].op, Operation::insert(2, 'x'));
    }

    #[test]
    fn test_invalid_edit_dropped_siblings_commit() {
        let mut session = session_with("hello");
        let alice = user("alice");
        session.add_user(alice.clone());

        let summary = session
            .handle_push(
                &alice,
                [
                    Operation::insert(0, '>'),
                    Operation::insert(99, 'x'),
                    Operation::erase(6),
                    Operation::insert(6, '<'),
                ],
            )
            .unwrap();

        assert_eq!(summary.committed, 2);
        assert_eq!(summary.dropped, 2);
        assert_eq!(session.state().snapshot(), ">hello<");
        assert_eq!(session.state().current_clock(), 2);
    }

    #[test]
    fn test_edit_at_max_position_is_dropped() {
        for window in [TransformWindow::SinceLastSync, TransformWindow::FullHistory] {
            let mut session = session_with_window("hello", window);
            let (alice, bob) = (user("alice"), user("bob"));
            session.add_user(alice.clone());
            session.add_user(bob.clone());

            session.handle_push(&alice, [Operation::insert(0, 'a')]).unwrap();

            let op: Operation = serde_json::from_str(
                r#"{"type":"INSERT","position":18446744073709551615,"character":"X"}"#,
            )
            .unwrap();
            let summary = session.handle_push(&bob, [op, Operation::insert(0, 'b')]).unwrap();

            assert_eq!(summary.dropped, 1, "window {window}");
            assert_eq!(summary.committed, 1, "window {window}");
            assert_eq!(session.state().current_clock(), 2);
            assert!(!session.state().snapshot().contains('X'));
        }
    }

    #[test]
    fn test_batch_observes_earlier_ops() {
        let mut session = session_with("");
        let alice = user("alice");
        session.add_user(alice.clone());

        let ops = "hey".chars().enumerate().map(|(i, c)| Operation::insert(i, c));
        session.handle_push(&alice, ops).unwrap();
        assert_eq!(session.state().snapshot(), "hey");
    }

    #[test]
    fn test_full_history_window_shifts_past_everything() {
        let mut session = session_with_window("", TransformWindow::FullHistory);
        let alice = user("alice");
        session.add_user(alice.clone());

        session.handle_push(&alice, [Operation::insert(0, 'a')]).unwrap();
        // the earlier insert at 0 is part of the window even though alice made it
        session.handle_push(&alice, [Operation::insert(0, 'b')]).unwrap();
        assert_eq!(session.state().snapshot(), "ab");
    }

    #[test]
    fn test_reposition_updates_cursor_only() {
        let mut session = session_with("hello");
        let alice = user("alice");
        session.add_user(alice.clone());

        let summary = session.handle_push(&alice, [Operation::reposition(3)]).unwrap();
        assert_eq!(summary.repositioned, 1);
        assert_eq!(session.presence(&alice).unwrap().cursor, 3);
        assert_eq!(session.state().current_clock(), 0);
    }

    #[test]
    fn test_push_from_unknown_user_fails() {
        let mut session = session_with("hello");
        let err = session
            .handle_push(&user("ghost"), [Operation::erase(0)])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownUser { .. }));
        assert_eq!(session.state().snapshot(), "hello");
    }

    #[test]
    fn test_pull_batches_and_advances() {
        let mut session = session_with("");
        let (alice, bob) = (user("alice"), user("bob"));
        session.add_user(alice.clone());
        session.add_user(bob.clone());

        let ops: Vec<Operation> = (0..25).map(|i| Operation::insert(i, 'x')).collect();
        session.handle_push(&alice, ops).unwrap();

        let mut seen = Vec::new();
        loop {
            match session.handle_pull(&bob).unwrap() {
                PullResult::Delta(batch) => {
                    assert!(batch.len() <= PULL_BATCH_LIMIT);
                    seen.extend(batch.into_iter().map(|e| e.timestamp));
                }
                PullResult::Presence(_) => break,
            }
        }

        assert_eq!(seen, (0..25).collect::<Vec<u64>>());
        assert_eq!(session.presence(&bob).unwrap().last_synced, 25);
    }

    #[test]
    fn test_pull_heartbeat_lists_every_user() {
        let mut session = session_with("hello");
        let (alice, bob) = (user("alice"), user("bob"));
        session.add_user(alice.clone());
        session.add_user(bob.clone());

        session.handle_push(&alice, [Operation::reposition(2)]).unwrap();
        session.handle_push(&bob, [Operation::reposition(4)]).unwrap();

        let PullResult::Presence(updates) = session.handle_pull(&alice).unwrap() else {
            panic!("expected presence heartbeat");
        };
        assert_eq!(
            updates,
            vec![
                PresenceUpdate { user: alice, timestamp: 0, position: 2 },
                PresenceUpdate { user: bob, timestamp: 0, position: 4 },
            ]
        );
    }

    #[test]
    fn test_convergence_regardless_of_arrival_order() {
        // two users edit "abc" concurrently; whichever push arrives first,
        // replaying the log reproduces the buffer
        for alice_first in [true, false] {
            let mut session = session_with("abc");
            let (alice, bob) = (user("alice"), user("bob"));
            session.add_user(alice.clone());
            session.add_user(bob.clone());

            let alice_ops = [Operation::insert(1, 'X'), Operation::erase(3)];
            let bob_ops = [Operation::erase(0), Operation::insert(2, 'Y')];
            if alice_first {
                session.handle_push(&alice, alice_ops).unwrap();
                session.handle_push(&bob, bob_ops).unwrap();
            } else {
                session.handle_push(&bob, bob_ops).unwrap();
                session.handle_push(&alice, alice_ops).unwrap();
            }

            let mut replay = Buffer::from_text("abc");
            for entry in session.state().confirmed_log() {
                match entry.op {
                    Operation::Insert { position, character } => {
                        replay.insert(position, &character.to_string()).unwrap()
                    }
                    Operation::Erase { position } => {
                        replay.erase(position).unwrap();
                    }
                    Operation::Reposition { .. } => {}
                }
            }
            assert_eq!(replay.to_string(), session.state().snapshot());

            let stamps: Vec<u64> =
                session.state().confirmed_log().iter().map(|e| e.timestamp).collect();
            assert_eq!(stamps, (0..stamps.len() as u64).collect::<Vec<_>>());
        }
    }
}
