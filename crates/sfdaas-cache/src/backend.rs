//! Cache backend trait and the in-process implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use sfdaas_core::{Clock, Result, SystemClock};
use tracing::debug;

/// External key-value store holding encoded results.
///
/// Implementations may lose entries at any time; the fingerprint cache
/// treats every failure as a miss unless told otherwise.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live entry. `Ok(None)` on miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key` for `ttl_seconds`.
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u32) -> Result<()>;

    /// Human-readable description (server list) for diagnostics.
    fn describe(&self) -> Vec<String>;
}

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// Default entry cap of the in-process backend.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Minimum spacing between full expiry purges on the write path.
const PURGE_INTERVAL_SECS: i64 = 60;

/// In-process backend with per-entry expiry and a size cap.
///
/// Writes purge expired entries at most once per `PURGE_INTERVAL_SECS`.
/// When the cap is reached, the entries closest to expiry are evicted first.
pub struct MemoryBackend {
    entries: DashMap<String, MemoryEntry>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
    last_purge: Mutex<DateTime<Utc>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        let now = clock.now();
        Self {
            entries: DashMap::new(),
            clock,
            max_entries: max_entries.max(1),
            last_purge: Mutex::new(now),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        *self.last_purge.lock() = now;
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }
        removed
    }

    fn purge_due(&self, now: DateTime<Utc>) -> bool {
        let last = *self.last_purge.lock();
        now.signed_duration_since(last) >= Duration::seconds(PURGE_INTERVAL_SECS)
    }

    /// Evict the entries closest to expiry until one more fits under the cap.
    fn make_room(&self) {
        let excess = (self.entries.len() + 1).saturating_sub(self.max_entries);
        if excess == 0 {
            return;
        }
        let mut by_expiry: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|e| (e.value().expires_at, e.key().clone()))
            .collect();
        by_expiry.sort_unstable();
        for (_, key) in by_expiry.into_iter().take(excess) {
            self.entries.remove(&key);
        }
        debug!("Evicted {} cache entries at capacity {}", excess, self.max_entries);
    }

    /// Number of stored entries, live or not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw stored bytes for `key`, ignoring expiry.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|e| e.value.clone())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        // Expired entries are purged atomically with the check.
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(self.entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u32) -> Result<()> {
        let now = self.clock.now();
        let expires_at = now + Duration::seconds(i64::from(ttl_seconds));

        if self.purge_due(now) {
            self.purge_expired();
        }
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.purge_expired();
            self.make_room();
        }

        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn describe(&self) -> Vec<String> {
        vec!["local".to_string()]
    }
}
