//! SFDaaS Cache: fingerprint-keyed memoization of propagation results.
//!
//! `FingerprintCache` sits in front of a `CacheBackend` (memcached in
//! production, `MemoryBackend` in-process) and guarantees that concurrent
//! requests for the same key share one computation. Backend failures fail
//! open unless the caller asks for cache-required semantics.

pub mod backend;
pub mod cache;
pub mod fingerprint;
pub mod memcached;

pub use backend::{CacheBackend, MemoryBackend, DEFAULT_MAX_ENTRIES};
pub use cache::{CacheOutcome, CacheStats, Cached, FingerprintCache};
pub use fingerprint::{resolve_key, FingerprintInput};
pub use memcached::{MemcachedBackend, MAX_TTL_SECONDS};
