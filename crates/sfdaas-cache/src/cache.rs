//! Single-flight result cache in front of a `CacheBackend`.
//!
//! Each key being resolved owns one in-flight marker: an `OnceCell` holding
//! the encoded outcome. The first caller to reach the cell performs the
//! backend lookup and, on a miss, the computation; everyone else awaits the
//! same cell. Markers are removed once resolved, so a later request goes back
//! to the backend and sees the stored entry.
//!
//! If the caller running the computation is cancelled, the cell stays
//! uninitialized and the next waiter takes over.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sfdaas_core::{Error, Result};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::backend::CacheBackend;

/// How a caller's value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    /// Read from the backend.
    Hit,
    /// Computed by this caller and written to the backend.
    Computed,
    /// Joined a lookup or computation another caller was already running.
    Shared,
}

/// A value plus what it took to produce it.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub outcome: CacheOutcome,
    /// True if the value came out of the backend, for this caller or the
    /// one it joined.
    pub from_backend: bool,
    /// Set when the computed value could not be written back.
    pub store_error: Option<String>,
}

/// Encoded outcome shared by everyone waiting on one key.
#[derive(Debug, Clone)]
struct Flight {
    bytes: Arc<Vec<u8>>,
    from_backend: bool,
    store_error: Option<String>,
}

type Marker = Arc<OnceCell<Result<Flight>>>;

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub shared: u64,
    #[serde(rename = "backendErrors")]
    pub backend_errors: u64,
    #[serde(rename = "storeErrors")]
    pub store_errors: u64,
    #[serde(rename = "inFlight")]
    pub in_flight: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    shared: AtomicU64,
    backend_errors: AtomicU64,
    store_errors: AtomicU64,
}

/// Memoizes computations by key with per-key single-flight.
pub struct FingerprintCache {
    backend: Arc<dyn CacheBackend>,
    timeout: Duration,
    in_flight: DashMap<String, Marker>,
    counters: Counters,
}

impl FingerprintCache {
    /// `timeout` bounds every backend get and set.
    pub fn new(backend: Arc<dyn CacheBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            in_flight: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Return the value for `key`, running `compute` at most once across all
    /// concurrent callers of the same key.
    ///
    /// Backend lookup failures and timeouts count as misses, unless
    /// `required` is set, in which case they fail with `CacheUnavailable`.
    /// A failed write after a successful computation is reported in
    /// `store_error` and does not fail the call. A computation error is
    /// returned to every caller that joined it and is not cached.
    pub async fn compute<T, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: u32,
        required: bool,
        compute: F,
    ) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let marker: Marker = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut led = false;
        let flight = marker
            .get_or_init(|| {
                led = true;
                self.resolve(key, ttl_seconds, required, compute)
            })
            .await
            .clone();

        // Only drop the marker we waited on; a newer one may already exist.
        self.in_flight
            .remove_if(key, |_, current| Arc::ptr_eq(current, &marker));

        let flight = flight?;
        let value: T = serde_json::from_slice(&flight.bytes)?;

        let outcome = if !led {
            self.counters.shared.fetch_add(1, Ordering::Relaxed);
            CacheOutcome::Shared
        } else if flight.from_backend {
            CacheOutcome::Hit
        } else {
            CacheOutcome::Computed
        };

        Ok(Cached {
            value,
            outcome,
            from_backend: flight.from_backend,
            store_error: flight.store_error,
        })
    }

    /// Lookup, and on a miss compute and store. Runs once per marker.
    async fn resolve<T, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: u32,
        required: bool,
        compute: F,
    ) -> Result<Flight>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lookup = match tokio::time::timeout(self.timeout, self.backend.get(key)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Backend(format!(
                "lookup timed out after {} ms",
                self.timeout.as_millis()
            ))),
        };

        match lookup {
            Ok(Some(bytes)) => {
                if serde_json::from_slice::<T>(&bytes).is_ok() {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("cache hit: {}", key);
                    return Ok(Flight {
                        bytes: Arc::new(bytes),
                        from_backend: true,
                        store_error: None,
                    });
                }
                warn!("cache entry {} does not decode, recomputing", key);
            }
            Ok(None) => {}
            Err(e) => {
                self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
                if required {
                    return Err(Error::CacheUnavailable(e.to_string()));
                }
                warn!("cache lookup failed for {}, computing anyway: {}", key, e);
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.counters.computations.fetch_add(1, Ordering::Relaxed);
        debug!("cache miss: {}", key);

        let value = compute().await?;
        let bytes = serde_json::to_vec(&value)?;

        let stored = match tokio::time::timeout(
            self.timeout,
            self.backend.set(key, &bytes, ttl_seconds),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Backend(format!(
                "store timed out after {} ms",
                self.timeout.as_millis()
            ))),
        };

        let store_error = match stored {
            Ok(()) => None,
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!("cache store failed for {}: {}", key, e);
                Some(e.to_string())
            }
        };

        Ok(Flight {
            bytes: Arc::new(bytes),
            from_backend: false,
            store_error,
        })
    }

    /// Number of keys currently being resolved.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            shared: self.counters.shared.load(Ordering::Relaxed),
            backend_errors: self.counters.backend_errors.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}
