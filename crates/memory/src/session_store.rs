//! Session store — keyed conversation histories with per-session writers.
//!
//! Every session has two locks:
//! - a writer lock, held by the one request allowed to append to it, for
//!   the whole duration of that request
//! - a short-lived state lock, taken to copy out a snapshot or to append
//!
//! Readers never wait for an in-flight request; they see the history as it
//! was before that request started. A request appends its turns in a single
//! [`SessionGuard::commit`], so a cancelled request leaves no trace.
//! Closing a session waits for its writer.

use chrono::Utc;
use parley_core::message::{Session, SessionId, Turn};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Clone)]
struct Slot {
    writer: Arc<Mutex<()>>,
    session: Arc<RwLock<Session>>,
    /// Set once the slot has been removed from the map.
    evicted: Arc<AtomicBool>,
}

impl Slot {
    fn new(id: SessionId) -> Self {
        Self {
            writer: Arc::new(Mutex::new(())),
            session: Arc::new(RwLock::new(Session::new(id))),
            evicted: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// In-memory session store with idle-time eviction.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Slot>>,
    ttl: Option<Duration>,
}

impl SessionStore {
    /// Create a store. `None` disables eviction.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    async fn slot(&self, id: &SessionId) -> Slot {
        if let Some(slot) = self.sessions.read().await.get(id) {
            return slot.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(session = %id, "Creating session");
                Slot::new(id.clone())
            })
            .clone()
    }

    /// A snapshot of the session, creating it if absent.
    pub async fn get_or_create(&self, id: &SessionId) -> Session {
        let slot = self.slot(id).await;
        let snapshot = slot.session.read().await.clone();
        snapshot
    }

    /// Append a single turn, waiting for any in-flight request on the session.
    pub async fn append(&self, id: &SessionId, turn: Turn) {
        self.lock(id).await.commit(vec![turn]).await;
    }

    /// The newest `max_turns` turns of a session, oldest first.
    ///
    /// Unknown sessions have an empty history and are not created.
    pub async fn history(&self, id: &SessionId, max_turns: usize) -> Vec<Turn> {
        let slot = match self.sessions.read().await.get(id) {
            Some(slot) => slot.clone(),
            None => return Vec::new(),
        };
        let history = slot.session.read().await.tail(max_turns);
        history
    }

    /// Become the session's single writer, waiting for the current one.
    ///
    /// The session is created if absent and marked active.
    pub async fn lock(&self, id: &SessionId) -> SessionGuard {
        loop {
            let slot = self.slot(id).await;
            let permit = slot.writer.clone().lock_owned().await;

            // Evicted or closed while we waited: start over on a fresh slot.
            if slot.evicted.load(Ordering::Acquire) {
                continue;
            }

            slot.session.write().await.touch();
            return SessionGuard {
                id: id.clone(),
                session: slot.session,
                _permit: permit,
            };
        }
    }

    /// Drop a session. Returns whether it existed.
    ///
    /// Waits for an in-flight request on the session to commit first.
    pub async fn close(&self, id: &SessionId) -> bool {
        let Some(slot) = self.sessions.read().await.get(id).cloned() else {
            return false;
        };

        let _permit = slot.writer.clone().lock_owned().await;
        if slot.evicted.swap(true, Ordering::AcqRel) {
            return false;
        }

        let mut sessions = self.sessions.write().await;
        if sessions
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(&current.session, &slot.session))
        {
            sessions.remove(id);
        }
        info!(session = %id, "Session closed");
        true
    }

    /// Remove sessions idle for longer than the TTL.
    ///
    /// Sessions with a request in flight are never evicted.
    pub async fn evict_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();

        for (id, slot) in sessions.iter() {
            let Ok(_permit) = slot.writer.try_lock() else {
                continue;
            };
            if idle_longer_than(&*slot.session.read().await, ttl) {
                slot.evicted.store(true, Ordering::Release);
                expired.push(id.clone());
            }
        }

        for id in &expired {
            sessions.remove(id);
        }

        if !expired.is_empty() {
            info!(evicted = expired.len(), remaining = sessions.len(), "Evicted idle sessions");
        }
        expired.len()
    }

    /// Run [`evict_expired`](Self::evict_expired) every `interval` in the background.
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.evict_expired().await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

fn idle_longer_than(session: &Session, ttl: Duration) -> bool {
    (Utc::now() - session.last_active)
        .to_std()
        .map(|idle| idle > ttl)
        .unwrap_or(false)
}

/// Exclusive write access to one session for the length of a request.
///
/// Dropping the guard without committing appends nothing.
pub struct SessionGuard {
    id: SessionId,
    session: Arc<RwLock<Session>>,
    _permit: OwnedMutexGuard<()>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    /// The newest `max_turns` turns, oldest first.
    pub async fn history(&self, max_turns: usize) -> Vec<Turn> {
        self.session.read().await.tail(max_turns)
    }

    /// Append all turns at once and release the session.
    pub async fn commit(self, turns: Vec<Turn>) {
        let mut session = self.session.write().await;
        let appended = turns.len();
        for turn in turns {
            session.push(turn);
        }
        session.touch();
        debug!(session = %self.id, appended, total = session.turns.len(), "Committed turns");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::message::{ContentPart, Role, ToolCallRequest};

    fn sid(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = SessionStore::default();
        let first = store.get_or_create(&sid("s1")).await;
        let second = store.get_or_create(&sid("s1")).await;
        assert_eq!(first.created_at, second.created_at);
        assert!(first.turns.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let store = SessionStore::default();
        let id = sid("s1");
        store.append(&id, Turn::user("one")).await;
        store.append(&id, Turn::assistant("two")).await;
        store.append(&id, Turn::user("three")).await;

        let texts: Vec<String> = store.history(&id, 10).await.iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn history_bounds() {
        let store = SessionStore::default();
        let id = sid("s1");
        for i in 0..4 {
            store.append(&id, Turn::user(format!("m{i}"))).await;
        }

        assert!(store.history(&id, 0).await.is_empty());
        assert_eq!(store.history(&id, 100).await.len(), 4);

        let tail = store.history(&id, 2).await;
        assert_eq!(tail[0].text(), "m2");
        assert_eq!(tail[1].text(), "m3");
    }

    #[tokio::test]
    async fn unknown_session_history_is_empty() {
        let store = SessionStore::default();
        assert!(store.history(&sid("ghost"), 10).await.is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn appended_turn_reads_back_unchanged() {
        let store = SessionStore::default();
        let id = sid("s1");
        let user = Turn::user_with_parts(vec![
            ContentPart::text("look"),
            ContentPart::image("https://example.com/a.png"),
            ContentPart::text("what is it?"),
        ]);
        let call = Turn::assistant_with_tool_calls(
            "",
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "knowledge_lookup".into(),
                arguments: serde_json::json!({"query": "cats"}),
            }],
        );
        let result = Turn::tool_result("call_1", "knowledge_lookup", "[]", false);

        let guard = store.lock(&id).await;
        guard.commit(vec![user.clone(), call.clone(), result.clone()]).await;

        let history = store.history(&id, 10).await;
        assert_eq!(history, vec![user, call, result]);
        assert_eq!(history[2].role, Role::Tool);
    }

    #[tokio::test]
    async fn dropped_guard_appends_nothing() {
        let store = SessionStore::default();
        let id = sid("s1");
        {
            let guard = store.lock(&id).await;
            assert!(guard.history(10).await.is_empty());
        }
        assert!(store.history(&id, 10).await.is_empty());
    }

    #[tokio::test]
    async fn writers_are_serialized_and_readers_see_snapshots() {
        let store = Arc::new(SessionStore::default());
        let id = sid("s1");
        store.append(&id, Turn::user("before")).await;

        let guard = store.lock(&id).await;

        // A second writer waits.
        let blocked = tokio::time::timeout(Duration::from_millis(20), store.lock(&id)).await;
        assert!(blocked.is_err());

        // Readers do not, and see the pre-request state.
        assert_eq!(store.history(&id, 10).await.len(), 1);

        let waiter = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.append(&id, Turn::user("after")).await })
        };

        guard.commit(vec![Turn::user("during"), Turn::assistant("reply")]).await;
        waiter.await.unwrap();

        let texts: Vec<String> = store.history(&id, 10).await.iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["before", "during", "reply", "after"]);
    }

    #[tokio::test]
    async fn evicts_idle_sessions() {
        let store = SessionStore::new(Some(Duration::from_millis(1)));
        store.append(&sid("old"), Turn::user("hi")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.evict_expired().await, 1);
        assert!(store.is_empty().await);
        assert!(store.history(&sid("old"), 10).await.is_empty());
    }

    #[tokio::test]
    async fn eviction_skips_sessions_with_request_in_flight() {
        let store = SessionStore::new(Some(Duration::from_millis(1)));
        let id = sid("busy");
        let guard = store.lock(&id).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.evict_expired().await, 0);
        guard.commit(vec![Turn::user("kept")]).await;
        assert_eq!(store.history(&id, 10).await.len(), 1);
    }

    #[tokio::test]
    async fn no_ttl_never_evicts() {
        let store = SessionStore::new(None);
        store.append(&sid("s1"), Turn::user("hi")).await;
        assert_eq!(store.evict_expired().await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn close_removes_session() {
        let store = SessionStore::default();
        store.append(&sid("s1"), Turn::user("hi")).await;
        assert!(store.close(&sid("s1")).await);
        assert!(!store.close(&sid("s1")).await);
        assert!(store.history(&sid("s1"), 10).await.is_empty());
    }

    #[tokio::test]
    async fn close_waits_for_in_flight_request() {
        let store = Arc::new(SessionStore::default());
        let id = sid("s1");
        let guard = store.lock(&id).await;

        let closing = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.close(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closing.is_finished());

        guard.commit(vec![Turn::user("q"), Turn::assistant("a")]).await;
        assert!(closing.await.unwrap());
        assert!(store.is_empty().await);

        // A later request starts a fresh session.
        assert!(store.lock(&id).await.history(10).await.is_empty());
    }

    #[tokio::test]
    async fn reaper_evicts_in_background() {
        let store = Arc::new(SessionStore::new(Some(Duration::from_millis(1))));
        store.append(&sid("s1"), Turn::user("hi")).await;

        let handle = store.clone().spawn_reaper(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(store.is_empty().await);
    }
}
