//! Session registry with lazy eviction on read and a periodic sweep.
//!
//! Sessions live in a `DashMap`, so request-path reads and the sweep only
//! ever lock the shard holding the entry they touch.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sfdaas_core::{Clock, SessionConfig, SystemClock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::session::Session;

/// Thread-safe in-memory session store.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    clock: Arc<dyn Clock>,
    default_ttl_seconds: i64,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            default_ttl_seconds: config.default_ttl_seconds,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create and register a new session with a random 128-bit id.
    pub fn create(&self) -> Session {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let session = Session::new(id, self.clock.now(), self.default_ttl_seconds);
        self.sessions.insert(session.id.clone(), session.clone());
        info!("Session created: {}", session.id);
        session
    }

    /// Live session by id. An expired session is evicted and `None` returned.
    pub fn get(&self, id: &str) -> Option<Session> {
        let now = self.clock.now();
        if self
            .sessions
            .remove_if(id, |_, s| s.is_expired(now))
            .is_some()
        {
            info!("Removed expired session: {}", id);
            return None;
        }
        self.sessions.get(id).map(|s| s.clone())
    }

    /// Live session for `id`, or a fresh one when absent, unknown or expired.
    pub fn get_or_create(&self, id: Option<&str>) -> Session {
        id.and_then(|id| self.get(id))
            .unwrap_or_else(|| self.create())
    }

    /// Mark the session accessed now, restarting its inactivity window.
    ///
    /// If the entry was swept between lookup and touch, it is reinstated.
    pub fn touch(&self, session: &mut Session) {
        let now = self.clock.now();
        session.last_accessed_at = now;
        self.sessions
            .entry(session.id.clone())
            .and_modify(|s| s.last_accessed_at = now)
            .or_insert_with(|| session.clone());
    }

    /// Override the inactivity TTL; zero or negative disables expiry.
    pub fn set_ttl(&self, session: &mut Session, ttl_seconds: i64) {
        session.ttl_seconds = ttl_seconds;
        if let Some(mut stored) = self.sessions.get_mut(&session.id) {
            stored.ttl_seconds = ttl_seconds;
        }
    }

    /// Bind an attribute. Returns false if the session no longer exists.
    pub fn set_attribute(&self, id: &str, name: &str, value: serde_json::Value) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut s) => {
                s.attributes.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn get_attribute(&self, id: &str, name: &str) -> Option<serde_json::Value> {
        self.sessions
            .get(id)
            .and_then(|s| s.attributes.get(name).cloned())
    }

    pub fn remove_attribute(&self, id: &str, name: &str) -> Option<serde_json::Value> {
        self.sessions
            .get_mut(id)
            .and_then(|mut s| s.attributes.remove(name))
    }

    /// Explicitly destroy a session.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!("Removed session: {}", id);
        }
        removed
    }

    /// Number of stored sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Evict every expired session. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.sessions.retain(|_, s| {
            let keep = !s.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Run `sweep` every `interval` on the tokio runtime.
    ///
    /// The task holds only a weak reference and ends once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            info!("Session sweeper started (every {}s)", interval.as_secs());
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Session store dropped, sweeper exiting");
                    break;
                };
                let removed = store.sweep();
                if removed > 0 {
                    info!("Cleaned up {} expired session(s)", removed);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfdaas_core::ManualClock;

    fn store() -> (Arc<SessionStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = SessionStore::with_clock(&SessionConfig::default(), clock.clone());
        (Arc::new(store), clock)
    }

    #[test]
    fn test_create_and_get() {
        let (store, _) = store();
        let s = store.create();
        assert_eq!(s.id.len(), 32);
        assert_eq!(s.created_at, s.last_accessed_at);
        assert_eq!(s.ttl_seconds, 1800);
        assert_eq!(store.get(&s.id).unwrap().id, s.id);
        assert_ne!(store.create().id, s.id);
    }

    #[test]
    fn test_reachable_until_ttl_then_gone() {
        let (store, clock) = store();
        let mut s = store.create();
        store.set_ttl(&mut s, 30);

        clock.advance_secs(30);
        assert!(store.get(&s.id).is_some());

        clock.advance_millis(1);
        assert!(store.get(&s.id).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_touch_resets_window() {
        let (store, clock) = store();
        let mut s = store.create();
        store.set_ttl(&mut s, 30);

        clock.advance_secs(25);
        store.touch(&mut s);
        clock.advance_secs(25);
        assert!(store.get(&s.id).is_some());

        clock.advance_secs(6);
        assert!(store.get(&s.id).is_none());
    }

    #[test]
    fn test_get_or_create_falls_back() {
        let (store, clock) = store();
        let fresh = store.get_or_create(None);
        assert_eq!(store.get_or_create(Some(&fresh.id)).id, fresh.id);
        assert_ne!(store.get_or_create(Some("no-such-id")).id, "no-such-id");

        clock.advance_secs(1801);
        assert_ne!(store.get_or_create(Some(&fresh.id)).id, fresh.id);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let (store, clock) = store();
        let mut s = store.create();
        store.set_ttl(&mut s, 0);
        clock.advance_secs(1_000_000);
        assert!(store.get(&s.id).is_some());
        assert_eq!(store.sweep(), 0);
    }

    #[test]
    fn test_huge_ttl_survives_get_and_sweep() {
        let (store, clock) = store();
        let mut s = store.create();
        store.set_ttl(&mut s, 9_300_000_000_000_000);
        let expired = store.create();

        clock.advance_secs(1801);
        assert_eq!(store.sweep(), 1);
        assert!(store.get(&expired.id).is_none());
        assert!(store.get(&s.id).is_some());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (store, clock) = store();
        let mut short = store.create();
        store.set_ttl(&mut short, 10);
        let long = store.create();

        clock.advance_secs(11);
        assert_eq!(store.sweep(), 1);
        assert!(store.get(&short.id).is_none());
        assert!(store.get(&long.id).is_some());
    }

    #[test]
    fn test_touch_reinstates_swept_session() {
        let (store, _) = store();
        let mut s = store.create();
        assert!(store.remove(&s.id));
        store.touch(&mut s);
        assert!(store.get(&s.id).is_some());
    }

    #[test]
    fn test_attributes() {
        let (store, _) = store();
        let s = store.create();
        assert!(store.set_attribute(&s.id, "lastPropagation", serde_json::json!("2010-05-29")));
        assert_eq!(
            store.get_attribute(&s.id, "lastPropagation"),
            Some(serde_json::json!("2010-05-29"))
        );
        assert!(store.remove_attribute(&s.id, "lastPropagation").is_some());
        assert!(store.get_attribute(&s.id, "lastPropagation").is_none());
        assert!(!store.set_attribute("missing", "k", serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_sweeper_task_runs() {
        let (store, clock) = store();
        let mut s = store.create();
        store.set_ttl(&mut s, 1);
        clock.advance_secs(2);

        let handle = store.spawn_sweeper(Duration::from_millis(10));
        for _ in 0..100 {
            if store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.is_empty());
        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_and_sweep() {
        let (store, clock) = store();
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let clock = clock.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let mut s = store.get_or_create(None);
                    store.touch(&mut s);
                    if i % 2 == 0 {
                        clock.advance_millis(1);
                        store.sweep();
                    }
                    assert!(store.get(&s.id).is_some());
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len(), 8 * 200);
    }
}
