//! Session entity and registry (spec §3 Session).
//!
//! A session's lifetime is one client connection: created on handshake,
//! torn down on disconnect or inactivity timeout. Turn-level state (the
//! FSM, transcript buffer, debounce controller) lives in `voice-core`;
//! this crate only tracks identity, liveness, and the debounce value
//! that must survive across turns within one session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

/// One client connection's identity and cross-turn state.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    last_active: RwLock<DateTime<Utc>>,
    /// Current adaptive debounce value, in milliseconds (spec §4.3).
    debounce_ms: AtomicU64,
}

impl Session {
    pub fn new(initial_debounce_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_active: RwLock::new(now),
            debounce_ms: AtomicU64::new(initial_debounce_ms),
        }
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms.load(Ordering::Relaxed)
    }

    pub fn set_debounce_ms(&self, value: u64) {
        self.debounce_ms.store(value, Ordering::Relaxed);
    }

    /// Mark the session as active now, resetting the inactivity clock.
    pub fn touch(&self) {
        *self.last_active.write() = Utc::now();
    }

    /// Whether the session has been idle for at least `timeout`.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        let idle = Utc::now().signed_duration_since(*self.last_active.read());
        idle >= chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero())
    }
}

/// Process-wide registry of live sessions, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.write().insert(session.id.clone(), session);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every session that has been idle past `timeout`.
    pub fn sweep_expired(&self, timeout: Duration) -> Vec<Arc<Session>> {
        let expired_ids: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        let mut sessions = self.sessions.write();
        expired_ids
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_not_expired() {
        let session = Session::new(400);
        assert!(!session.is_expired(Duration::from_secs(300)));
    }

    #[test]
    fn debounce_value_is_mutable() {
        let session = Session::new(400);
        assert_eq!(session.debounce_ms(), 400);
        session.set_debounce_ms(450);
        assert_eq!(session.debounce_ms(), 450);
    }

    #[test]
    fn registry_insert_get_remove() {
        let registry = SessionRegistry::new();
        let session = Arc::new(Session::new(400));
        let id = session.id.clone();
        registry.insert(session);
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.len(), 1);
        registry.remove(&id);
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn sweep_expired_only_removes_stale_sessions() {
        let registry = SessionRegistry::new();
        let fresh = Arc::new(Session::new(400));
        fresh.touch();
        let fresh_id = fresh.id.clone();
        registry.insert(fresh);

        let swept = registry.sweep_expired(Duration::from_secs(300));
        assert!(swept.is_empty());
        assert!(registry.get(&fresh_id).is_some());
    }
}
