//! Session Manager - registry of live document sessions
//!
//! Each document id maps to a slot guarded by its own async mutex, so every
//! register, unregister, push, pull and background flush on one document runs
//! exclusively while different documents proceed in parallel. A slot is
//! created through the map's entry API and retired (removed from the map)
//! under its own lock; callers that lock a retired slot look it up again.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::id::{DocumentId, UserId};
use crate::operation::{Operation, PullResult};
use crate::session::{PushSummary, Session};
use crate::state::DocumentState;
use crate::storage::{ContentStore, LocationResolver, StorageError};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum SlotState {
    /// Entry created, session not loaded yet
    Vacant,
    Live(Session),
    /// Torn down and removed from the registry
    Retired,
}

struct Slot {
    state: Mutex<SlotState>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Vacant),
        }
    }
}

/// Manager statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub session_count: usize,
    pub user_count: usize,
}

/// Routes requests to per-document sessions, creating and destroying them
pub struct SessionManager {
    slots: DashMap<DocumentId, Arc<Slot>>,
    resolver: Arc<dyn LocationResolver>,
    store: Arc<dyn ContentStore>,
    config: EngineConfig,
    /// Set by `shutdown`; no session opens afterwards
    closed: AtomicBool,
}

impl SessionManager {
    pub fn new(
        resolver: Arc<dyn LocationResolver>,
        store: Arc<dyn ContentStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            slots: DashMap::new(),
            resolver,
            store,
            config,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Add `user` to the session of `id`, opening the session from the
    /// backing store if needed. Returns the current document text.
    pub async fn register(&self, user: &UserId, id: &DocumentId) -> Result<String> {
        loop {
            let slot = self.slot(id);
            let mut guard = slot.state.lock().await;

            if matches!(*guard, SlotState::Retired) {
                continue;
            }

            if matches!(*guard, SlotState::Vacant) {
                if self.is_closed() {
                    *guard = SlotState::Retired;
                    self.retire(id, &slot);
                    warn!(doc_id = %id, user = %user, "Register after shutdown");
                    return Err(Error::ShuttingDown);
                }

                match self.open(id, &slot).await {
                    Ok(session) => *guard = SlotState::Live(session),
                    Err(e) => {
                        *guard = SlotState::Retired;
                        self.retire(id, &slot);
                        warn!(doc_id = %id, user = %user, error = %e, "Failed to open session");
                        return Err(e);
                    }
                }
            }

            if let SlotState::Live(session) = &mut *guard {
                if session.state_mut().reconcile() {
                    warn!(doc_id = %id, "Rebuilt buffer from pending edits");
                }
                session.add_user(user.clone());
                info!(doc_id = %id, user = %user, users = session.user_count(), "User registered");
                return Ok(session.state().snapshot());
            }
        }
    }

    /// Remove `user` from the session of `id`; the last user out tears the
    /// session down. Unknown documents and users are logged and ignored.
    ///
    /// Returns whether a user was removed.
    pub async fn unregister(&self, user: &UserId, id: &DocumentId) -> bool {
        let Some(slot) = self.existing_slot(id) else {
            warn!(doc_id = %id, user = %user, "Unregister for unknown document");
            return false;
        };

        let mut guard = slot.state.lock().await;
        let SlotState::Live(session) = &mut *guard else {
            warn!(doc_id = %id, user = %user, "Unregister for unknown document");
            return false;
        };

        if let Err(e) = session.remove_user(user) {
            warn!(doc_id = %id, error = %e, "Unregister for unknown user");
            return false;
        }
        info!(doc_id = %id, user = %user, users = session.user_count(), "User unregistered");

        if session.user_count() == 0 {
            session.teardown().await;
            *guard = SlotState::Retired;
            self.retire(id, &slot);
            info!(doc_id = %id, "Session closed");
        }
        true
    }

    /// Pull pending edits for `user`, registering it first if the document or
    /// user is unknown.
    pub async fn pull(&self, user: &UserId, id: &DocumentId) -> Result<PullResult> {
        if let Some(result) = self.with_member(user, id, |s| s.handle_pull(user)).await {
            return result;
        }

        debug!(doc_id = %id, user = %user, "Pull from unregistered user, registering");
        self.register(user, id).await?;
        self.with_member(user, id, |s| s.handle_pull(user))
            .await
            .unwrap_or_else(|| Err(unknown_user(user, id)))
    }

    /// Push edits from `user`, registering it first if the document or user
    /// is unknown.
    pub async fn push(
        &self,
        user: &UserId,
        id: &DocumentId,
        ops: &[Operation],
    ) -> Result<PushSummary> {
        let apply = |s: &mut Session| s.handle_push(user, ops.iter().copied());
        if let Some(result) = self.with_member(user, id, apply).await {
            return result;
        }

        debug!(doc_id = %id, user = %user, "Push from unregistered user, registering");
        self.register(user, id).await?;
        self.with_member(user, id, apply)
            .await
            .unwrap_or_else(|| Err(unknown_user(user, id)))
    }

    /// Tear down every live session, flushing each one. Later registrations,
    /// including the implicit ones of pull and push, fail with
    /// [`Error::ShuttingDown`].
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let slots: Vec<(DocumentId, Arc<Slot>)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (id, slot) in slots {
            let mut guard = slot.state.lock().await;
            if let SlotState::Live(session) = &mut *guard {
                session.teardown().await;
            }
            *guard = SlotState::Retired;
            self.retire(&id, &slot);
        }
        info!("All sessions closed");
    }

    /// Get statistics
    pub async fn stats(&self) -> ManagerStats {
        let slots: Vec<Arc<Slot>> = self.slots.iter().map(|e| e.value().clone()).collect();

        let mut stats = ManagerStats::default();
        for slot in slots {
            if let SlotState::Live(session) = &*slot.state.lock().await {
                stats.session_count += 1;
                stats.user_count += session.user_count();
            }
        }
        stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether a session for `id` is currently registered
    pub fn is_open(&self, id: &DocumentId) -> bool {
        self.slots.contains_key(id)
    }

    fn slot(&self, id: &DocumentId) -> Arc<Slot> {
        self.slots
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .value()
            .clone()
    }

    fn existing_slot(&self, id: &DocumentId) -> Option<Arc<Slot>> {
        self.slots.get(id).map(|entry| entry.value().clone())
    }

    /// Remove `slot` from the registry unless it was already replaced
    fn retire(&self, id: &DocumentId, slot: &Arc<Slot>) {
        self.slots.remove_if(id, |_, current| Arc::ptr_eq(current, slot));
    }

    /// Run `f` on the session of `id` if it is live and `user` is present
    async fn with_member<R>(
        &self,
        user: &UserId,
        id: &DocumentId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let slot = self.existing_slot(id)?;
        let mut guard = slot.state.lock().await;
        match &mut *guard {
            SlotState::Live(session) if session.contains(user) => Some(f(session)),
            _ => None,
        }
    }

    async fn open(&self, id: &DocumentId, slot: &Arc<Slot>) -> Result<Session> {
        let location = self.resolver.resolve(id).await.map_err(|e| match e {
            StorageError::NotFound(_) => Error::UnknownDocument(id.to_string()),
            other => Error::Storage(other),
        })?;
        let content = self.store.read(&location).await?;

        let mut state = DocumentState::new(id.clone(), location, self.store.clone(), &content);
        state.attach_flush_task(spawn_flush_task(
            id.clone(),
            Arc::downgrade(slot),
            self.config.flush_interval(),
        ));

        info!(
            doc_id = %id,
            location = %state.location(),
            chars = state.len(),
            window = %self.config.transform_window,
            "Session opened"
        );
        Ok(Session::new(state, self.config.transform_window))
    }
}

fn unknown_user(user: &UserId, id: &DocumentId) -> Error {
    Error::UnknownUser {
        user: user.to_string(),
        document: id.to_string(),
    }
}

/// Periodically flush the session in `slot` until it is retired
fn spawn_flush_task(id: DocumentId, slot: Weak<Slot>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(slot) = slot.upgrade() else { break };
            let mut guard = slot.state.lock().await;
            let SlotState::Live(session) = &mut *guard else { break };

            let state = session.state_mut();
            if !state.is_dirty() {
                continue;
            }
            match state.flush().await {
                Ok(flushed) => debug!(doc_id = %id, flushed, "Periodic flush"),
                Err(e) => warn!(doc_id = %id, error = %e, "Periodic flush failed, retrying next tick"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformWindow;
    use crate::testing::RecordingStore;

    fn manager_with(store: Arc<RecordingStore>) -> SessionManager {
        SessionManager::new(store.clone(), store, EngineConfig::default())
    }

    fn ids(doc: &str, user: &str) -> (DocumentId, UserId) {
        (DocumentId::new(doc).unwrap(), UserId::new(user).unwrap())
    }

    #[tokio::test]
    async fn test_register_returns_backing_content() {
        let store = Arc::new(RecordingStore::new());
        store.seed("notes.txt", "hello");
        let manager = manager_with(store);
        let (doc, alice) = ids("notes", "alice");

        assert_eq!(manager.register(&alice, &doc).await.unwrap(), "hello");
        assert!(manager.is_open(&doc));
        assert_eq!(
            manager.stats().await,
            ManagerStats { session_count: 1, user_count: 1 }
        );
    }

    #[tokio::test]
    async fn test_register_unresolvable_document() {
        let manager = manager_with(Arc::new(RecordingStore::new()));
        let (doc, alice) = ids("missing:doc", "alice");

        let err = manager.register(&alice, &doc).await.unwrap_err();
        assert!(matches!(err, Error::UnknownDocument(_)));
        assert!(!manager.is_open(&doc));
    }

    #[tokio::test]
    async fn test_push_pull_between_users() {
        let store = Arc::new(RecordingStore::new());
        store.seed("notes.txt", "hello");
        let manager = manager_with(store);
        let (doc, alice) = ids("notes", "alice");
        let bob = UserId::new("bob").unwrap();

        manager.register(&alice, &doc).await.unwrap();
        manager.register(&bob, &doc).await.unwrap();

        manager.push(&alice, &doc, &[Operation::insert(5, '!')]).await.unwrap();
        manager.push(&bob, &doc, &[Operation::erase(0)]).await.unwrap();

        let PullResult::Delta(ops) = manager.pull(&alice, &doc).await.unwrap() else {
            panic!("expected delta");
        };
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].op, Operation::insert(5, '!'));
        assert_eq!(ops[1].op, Operation::erase(0));
        assert_eq!(ops[1].user, bob);

        // a late registration sees the merged content
        let carol = UserId::new("carol").unwrap();
        assert_eq!(manager.register(&carol, &doc).await.unwrap(), "ello!");
    }

    #[tokio::test]
    async fn test_pull_self_heals_unknown_document() {
        let store = Arc::new(RecordingStore::new());
        store.seed("notes.txt", "abc");
        let manager = manager_with(store);
        let (doc, alice) = ids("notes", "alice");

        let result = manager.pull(&alice, &doc).await.unwrap();
        let PullResult::Presence(updates) = result else {
            panic!("expected presence heartbeat");
        };
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].user, alice);
    }

    #[tokio::test]
    async fn test_push_self_heals_unknown_user() {
        let store = Arc::new(RecordingStore::new());
        store.seed("notes.txt", "abc");
        let manager = manager_with(store);
        let (doc, alice) = ids("notes", "alice");
        let bob = UserId::new("bob").unwrap();

        manager.register(&alice, &doc).await.unwrap();
        let summary = manager.push(&bob, &doc, &[Operation::insert(3, 'd')]).await.unwrap();
        assert_eq!(summary.committed, 1);
        assert_eq!(manager.stats().await.user_count, 2);
        assert_eq!(manager.register(&alice, &doc).await.unwrap(), "abcd");
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let manager = manager_with(Arc::new(RecordingStore::new()));
        let (doc, alice) = ids("notes", "alice");

        assert!(!manager.unregister(&alice, &doc).await);

        manager.register(&alice, &doc).await.unwrap();
        assert!(!manager.unregister(&UserId::new("bob").unwrap(), &doc).await);
        assert_eq!(manager.stats().await.user_count, 1);
    }

    #[tokio::test]
    async fn test_last_unregister_flushes_once_and_removes_session() {
        let store = Arc::new(RecordingStore::new());
        store.seed("notes.txt", "hello");
        let manager = manager_with(store.clone());
        let (doc, alice) = ids("notes", "alice");
        let bob = UserId::new("bob").unwrap();

        manager.register(&alice, &doc).await.unwrap();
        manager.register(&bob, &doc).await.unwrap();
        manager.push(&alice, &doc, &[Operation::insert(5, '!')]).await.unwrap();

        assert!(manager.unregister(&alice, &doc).await);
        assert_eq!(store.write_count(), 0);
        assert!(manager.is_open(&doc));

        assert!(manager.unregister(&bob, &doc).await);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.content("notes.txt").as_deref(), Some("hello!"));
        assert!(!manager.is_open(&doc));
        assert_eq!(manager.stats().await, ManagerStats::default());

        // a second unregister does not flush again
        assert!(!manager.unregister(&bob, &doc).await);
        assert_eq!(store.write_count(), 1);

        // re-registering rebuilds from backing content with a fresh clock
        assert_eq!(manager.register(&alice, &doc).await.unwrap(), "hello!");
        let PullResult::Presence(updates) = manager.pull(&alice, &doc).await.unwrap() else {
            panic!("expected presence heartbeat");
        };
        assert_eq!(updates[0].timestamp, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_writes_dirty_documents() {
        let store = Arc::new(RecordingStore::new());
        store.seed("notes.txt", "hello");
        let config = EngineConfig {
            flush_interval_secs: 5,
            transform_window: TransformWindow::SinceLastSync,
        };
        let manager = SessionManager::new(store.clone(), store.clone(), config);
        let (doc, alice) = ids("notes", "alice");

        manager.register(&alice, &doc).await.unwrap();
        manager.push(&alice, &doc, &[Operation::erase(0)]).await.unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(store.content("notes.txt").as_deref(), Some("ello"));
        assert_eq!(store.write_count(), 1);

        // nothing changed since, so later ticks do not write
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_retries_after_failure() {
        let store = Arc::new(RecordingStore::new());
        let config = EngineConfig {
            flush_interval_secs: 5,
            ..Default::default()
        };
        let manager = SessionManager::new(store.clone(), store.clone(), config);
        let (doc, alice) = ids("notes", "alice");

        manager.register(&alice, &doc).await.unwrap();
        manager.push(&alice, &doc, &[Operation::insert(0, 'a')]).await.unwrap();

        store.fail_writes(true);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(store.write_count(), 0);

        // edits keep landing while persistence is failing
        manager.push(&alice, &doc, &[Operation::insert(1, 'b')]).await.unwrap();

        store.fail_writes(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.content("notes.txt").as_deref(), Some("ab"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_keep_gapless_log() {
        let store = Arc::new(RecordingStore::new());
        let manager = Arc::new(manager_with(store));
        let doc = DocumentId::new("shared").unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let manager = manager.clone();
            let doc = doc.clone();
            handles.push(tokio::spawn(async move {
                let user = UserId::new(format!("user-{n}")).unwrap();
                for _ in 0..20 {
                    manager.push(&user, &doc, &[Operation::insert(0, 'x')]).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reader = UserId::new("reader").unwrap();
        assert_eq!(manager.register(&reader, &doc).await.unwrap(), "x".repeat(160));
        assert_eq!(manager.stats().await.user_count, 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_register_racing_teardown() {
        let store = Arc::new(RecordingStore::new());
        let manager = Arc::new(manager_with(store));
        let doc = DocumentId::new("churn").unwrap();

        let mut handles = Vec::new();
        for n in 0..4 {
            let manager = manager.clone();
            let doc = doc.clone();
            handles.push(tokio::spawn(async move {
                let user = UserId::new(format!("user-{n}")).unwrap();
                for _ in 0..25 {
                    manager.register(&user, &doc).await.unwrap();
                    assert!(manager.unregister(&user, &doc).await);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(!manager.is_open(&doc));
        assert_eq!(manager.stats().await, ManagerStats::default());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_all_sessions() {
        let store = Arc::new(RecordingStore::new());
        let manager = manager_with(store.clone());
        let alice = UserId::new("alice").unwrap();

        for name in ["a", "b"] {
            let doc = DocumentId::new(name).unwrap();
            manager.push(&alice, &doc, &[Operation::insert(0, 'z')]).await.unwrap();
        }

        manager.shutdown().await;
        assert_eq!(store.content("a.txt").as_deref(), Some("z"));
        assert_eq!(store.content("b.txt").as_deref(), Some("z"));
        assert_eq!(manager.stats().await.session_count, 0);
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_are_refused() {
        let store = Arc::new(RecordingStore::new());
        let manager = manager_with(store.clone());
        let (doc, alice) = ids("a", "alice");

        manager.push(&alice, &doc, &[Operation::insert(0, 'z')]).await.unwrap();
        manager.shutdown().await;
        assert!(manager.is_closed());
        assert_eq!(store.write_count(), 1);

        let pushed = manager.push(&alice, &doc, &[Operation::insert(0, 'y')]).await;
        assert!(matches!(pushed, Err(Error::ShuttingDown)));
        assert!(matches!(manager.pull(&alice, &doc).await, Err(Error::ShuttingDown)));

        let (other, bob) = ids("b", "bob");
        assert!(matches!(manager.register(&bob, &other).await, Err(Error::ShuttingDown)));

        assert!(!manager.is_open(&doc));
        assert!(!manager.is_open(&other));
        assert_eq!(manager.stats().await.session_count, 0);
        // the refused edit never reached the buffer, so nothing is left unflushed
        assert_eq!(store.content("a.txt").as_deref(), Some("z"));
        assert_eq!(store.write_count(), 1);
    }
}
