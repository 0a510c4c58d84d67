//! Per-request coordination of sessions, caching and propagation.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use sfdaas_cache::{
    resolve_key, CacheBackend, CacheOutcome, FingerprintCache, FingerprintInput, MemcachedBackend,
    MemoryBackend, MAX_TTL_SECONDS as MAX_CACHE_TTL_SECONDS,
};
use sfdaas_core::parse::{parse_epoch, parse_vector, render_epoch, render_vector};
use sfdaas_core::{Clock, Error, OrbitalState, Result, SfdConfig, SystemClock};
use sfdaas_propagate::{Propagation, StatePropagator};
use sfdaas_session::{Session, SessionStore, MAX_TTL_SECONDS as MAX_SESSION_TTL_SECONDS};
use tracing::{debug, info};

use crate::types::*;

/// Session attribute holding the target epoch of the last propagation.
pub const LAST_PROPAGATION_ATTR: &str = "lastPropagation";

/// Parameters without which a propagation cannot run, in reporting order.
const REQUIRED_PARAMS: [&str; 4] = ["t0", "r0", "v0", "tf"];

/// Outcome of one request. The session id is always known, even on failure,
/// so the boundary can keep the client's cookie current.
#[derive(Debug)]
pub struct Handled {
    pub session_id: String,
    pub result: Result<PropagationReport>,
}

/// A computation run by this request: start, end and RK4 step count.
#[derive(Debug, Clone, Copy)]
struct ComputeRun {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    steps: u64,
}

/// Coordinates sessions, caching and propagation for concurrent requests.
///
/// Shareable behind an `Arc`; every method takes `&self`.
pub struct RequestCoordinator {
    config: SfdConfig,
    clock: Arc<dyn Clock>,
    sessions: Arc<SessionStore>,
    propagator: Arc<StatePropagator>,
    /// In-process cache used when no memcached address is configured.
    local_cache: Arc<FingerprintCache>,
    /// One cache per distinct memcached address list, so single-flight spans
    /// every request that targets the same servers. Bounded by
    /// `CacheConfig::max_remote_caches`.
    remote_caches: DashMap<String, Arc<FingerprintCache>>,
}

impl RequestCoordinator {
    pub fn new(config: SfdConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create with an explicit clock (for testing).
    pub fn with_clock(config: SfdConfig, clock: Arc<dyn Clock>) -> Self {
        let sessions = Arc::new(SessionStore::with_clock(&config.session, clock.clone()));
        let propagator = Arc::new(StatePropagator::new(config.propagator.clone()));
        let local: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::with_capacity(
            clock.clone(),
            config.cache.local_max_entries,
        ));
        let local_cache = Arc::new(FingerprintCache::new(local, config.cache.backend_timeout));

        info!(
            "Coordinator initialized: step={}s, max_span={}s, cache_timeout={}ms, default_cache={}",
            config.propagator.step_seconds,
            config.propagator.max_span_seconds,
            config.cache.backend_timeout.as_millis(),
            config.cache.default_addresses.as_deref().unwrap_or("local"),
        );

        Self {
            config,
            clock,
            sessions,
            propagator,
            local_cache,
            remote_caches: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SfdConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn local_cache(&self) -> &Arc<FingerprintCache> {
        &self.local_cache
    }

    /// Resolve the client's session, creating one if needed, and touch it.
    ///
    /// Call exactly once per request, before anything else reads the session.
    pub fn open_session(&self, session_id: Option<&str>) -> Session {
        let mut session = self.sessions.get_or_create(session_id);
        self.sessions.touch(&mut session);
        session
    }

    /// Handle one propagation request.
    pub async fn handle(&self, request: PropagationRequest) -> Handled {
        let run_start = self.clock.now();
        let mut session = self.open_session(request.session_id.as_deref());
        let result = self.run(&mut session, &request, run_start).await;
        if let Err(e) = &result {
            debug!("Propagation request failed for session {}: {}", session.id, e);
        }
        Handled {
            session_id: session.id,
            result,
        }
    }

    async fn run(
        &self,
        session: &mut Session,
        request: &PropagationRequest,
        run_start: DateTime<Utc>,
    ) -> Result<PropagationReport> {
        let (t0_raw, r0_raw, v0_raw, tf_raw) = match (
            request.t0.as_deref(),
            request.r0.as_deref(),
            request.v0.as_deref(),
            request.tf.as_deref(),
        ) {
            (Some(t0), Some(r0), Some(v0), Some(tf)) => (t0, r0, v0, tf),
            (t0, r0, v0, tf) => {
                let missing = REQUIRED_PARAMS
                    .iter()
                    .zip([t0, r0, v0, tf])
                    .filter(|(_, value)| value.is_none())
                    .map(|(name, _)| name.to_string())
                    .collect();
                return Err(Error::MissingParameter(missing));
            }
        };

        if request.sf.is_some() {
            let st = request.st.as_deref().unwrap_or("1800");
            let ttl = session_ttl(st)?;
            self.sessions.set_ttl(session, ttl);
        }

        let t0 = parse_epoch("t0", t0_raw)?;
        let tf = parse_epoch("tf", tf_raw)?;
        let r0 = parse_vector("r0", r0_raw)?;
        let v0 = parse_vector("v0", v0_raw)?;
        let initial = OrbitalState::new(t0, r0, v0)?;

        let cache_enabled = request.cf.as_deref().map(str::trim) == Some("1");
        let run: Mutex<Option<ComputeRun>> = Mutex::new(None);
        let mut caching = CachingInfo::default();

        let final_state = if cache_enabled {
            let ttl = self.cache_ttl(request.ct.as_deref())?;
            let required =
                request.cr.as_deref().map(str::trim) == Some("1") || self.config.cache.required;
            let cache = self.cache_for(request.ca.as_deref())?;

            let principal = request
                .principal
                .as_deref()
                .unwrap_or(self.config.principal.as_str());
            let input = FingerprintInput {
                principal,
                session_id: &session.id,
                t0,
                r0: &r0,
                v0: &v0,
                tf,
            };
            let explicit = request.ck.as_deref().filter(|k| !k.is_empty());
            let key = resolve_key(explicit, &input);

            let cached = cache
                .compute(&key, ttl, required, || async {
                    let propagation = self.propagate(&initial, tf, &run).await?;
                    Ok(propagation.state)
                })
                .await?;

            let now = self.clock.now();
            caching.enabled = true;
            caching.hit = Some(cached.from_backend);
            caching.shared = Some(cached.outcome == CacheOutcome::Shared);
            caching.ttl = Some(ttl);
            caching.servers = Some(cache.backend().describe());
            if cached.from_backend {
                caching.retrieved_at = Some(stamp(&now));
            } else if cached.outcome == CacheOutcome::Computed && cached.store_error.is_none() {
                caching.stored_at = Some(stamp(&now));
                caching.expires_at =
                    Some(stamp(&(now + ChronoDuration::seconds(i64::from(ttl)))));
            }
            caching.store_error = cached.store_error;
            debug!("Cache {:?} for key {}", cached.outcome, key);
            caching.key = Some(key);

            cached.value
        } else {
            self.propagate(&initial, tf, &run).await?.state
        };

        let aposteriori = Aposteriori {
            tf: render_epoch(&final_state.epoch),
            rf: render_vector(&final_state.position),
            vf: render_vector(&final_state.velocity),
        };
        self.sessions.set_attribute(
            &session.id,
            LAST_PROPAGATION_ATTR,
            serde_json::Value::String(aposteriori.tf.clone()),
        );

        let run_stop = self.clock.now();
        let computed = *run.lock();
        let timing = TimingInfo {
            run_start: stamp(&run_start),
            run_stop: stamp(&run_stop),
            total_time_ms: (run_stop - run_start).num_milliseconds(),
            propagation_start: computed.map(|c| stamp(&c.start)),
            propagation_end: computed.map(|c| stamp(&c.end)),
            propagation_time_ms: computed.map(|c| (c.end - c.start).num_milliseconds()),
        };

        info!(
            "Propagated session={} cache={} total={}ms",
            session.id, cache_enabled, timing.total_time_ms
        );

        Ok(PropagationReport {
            status: "success",
            data: ReportData {
                apriori: Apriori {
                    t0: t0_raw.to_string(),
                    r0: r0_raw.to_string(),
                    v0: v0_raw.to_string(),
                },
                aposteriori,
            },
            diagnostics: Diagnostics {
                assumptions: assumptions(),
                timing,
                caching,
                session: SessionInfo::from(&*session),
                propagator: PropagatorInfo {
                    step_seconds: self.config.propagator.step_seconds,
                    gm: self.config.propagator.gm,
                    steps: computed.map(|c| c.steps),
                },
            },
        })
    }

    /// Run the propagator off the async workers and record the run.
    async fn propagate(
        &self,
        initial: &OrbitalState,
        target: DateTime<Utc>,
        record: &Mutex<Option<ComputeRun>>,
    ) -> Result<Propagation> {
        let propagator = self.propagator.clone();
        let initial = initial.clone();

        let start = self.clock.now();
        let propagation = tokio::task::spawn_blocking(move || propagator.propagate(&initial, target))
            .await
            .map_err(|e| Error::Internal(format!("propagation task failed: {}", e)))??;
        let end = self.clock.now();

        *record.lock() = Some(ComputeRun {
            start,
            end,
            steps: propagation.steps,
        });
        debug!("Propagation took {} steps", propagation.steps);
        Ok(propagation)
    }

    fn cache_ttl(&self, ct: Option<&str>) -> Result<u32> {
        let Some(raw) = ct else {
            return Ok(self.config.cache.default_ttl_seconds);
        };
        match raw.trim().parse::<u32>() {
            Ok(ttl) if ttl > 0 && ttl <= MAX_CACHE_TTL_SECONDS => Ok(ttl),
            _ => Err(Error::Parse(format!(
                "ct: expected integer seconds in 1..={}, got {:?}",
                MAX_CACHE_TTL_SECONDS, raw
            ))),
        }
    }

    /// Cache for the request's `ca`, falling back to configured addresses and
    /// then to the in-process backend.
    fn cache_for(&self, ca: Option<&str>) -> Result<Arc<FingerprintCache>> {
        let addresses = ca
            .filter(|a| !a.trim().is_empty())
            .or(self.config.cache.default_addresses.as_deref());
        let Some(addresses) = addresses else {
            return Ok(self.local_cache.clone());
        };

        let registry_key = addresses.split_whitespace().collect::<Vec<_>>().join(" ");
        if let Some(cache) = self.remote_caches.get(&registry_key) {
            return Ok(cache.clone());
        }

        let backend = MemcachedBackend::from_addresses(&registry_key).map_err(|e| match e {
            Error::Config(msg) => Error::Parse(format!("ca: {}", msg)),
            other => other,
        })?;
        self.evict_idle_remote(&registry_key);
        let timeout = self.config.cache.backend_timeout;
        let cache = self
            .remote_caches
            .entry(registry_key)
            .or_insert_with(|| {
                info!("Registered memcached servers: {:?}", backend.describe());
                Arc::new(FingerprintCache::new(Arc::new(backend), timeout))
            })
            .clone();
        Ok(cache)
    }

    /// Make room for `incoming` in the remote registry by dropping caches with
    /// no computation in flight. Requests still holding a dropped cache keep
    /// using it until they finish.
    fn evict_idle_remote(&self, incoming: &str) {
        let limit = self.config.cache.max_remote_caches.max(1);
        if self.remote_caches.len() < limit {
            return;
        }
        let idle: Vec<String> = self
            .remote_caches
            .iter()
            .filter(|e| e.key() != incoming && e.value().in_flight() == 0)
            .map(|e| e.key().clone())
            .take(self.remote_caches.len() + 1 - limit)
            .collect();
        for key in idle {
            if self
                .remote_caches
                .remove_if(&key, |_, cache| cache.in_flight() == 0)
                .is_some()
            {
                debug!("Dropped idle memcached registration: {}", key);
            }
        }
    }
}

/// Parse `st`: integer seconds, at most one year. Zero or negative disables expiry.
fn session_ttl(raw: &str) -> Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(ttl) if ttl <= MAX_SESSION_TTL_SECONDS => Ok(ttl),
        _ => Err(Error::Parse(format!(
            "st: expected integer seconds up to {}, got {:?}",
            MAX_SESSION_TTL_SECONDS, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfdaas_core::ManualClock;

    fn coordinator() -> RequestCoordinator {
        RequestCoordinator::with_clock(SfdConfig::default(), Arc::new(ManualClock::new(Utc::now())))
    }

    #[test]
    fn test_cache_ttl() {
        let c = coordinator();
        assert_eq!(c.cache_ttl(None).unwrap(), 60);
        assert_eq!(c.cache_ttl(Some("120")).unwrap(), 120);
        assert!(matches!(c.cache_ttl(Some("0")), Err(Error::Parse(_))));
        assert!(matches!(c.cache_ttl(Some("-5")), Err(Error::Parse(_))));
        assert!(matches!(c.cache_ttl(Some("soon")), Err(Error::Parse(_))));
        assert_eq!(c.cache_ttl(Some("2592000")).unwrap(), 2_592_000);
        assert!(matches!(c.cache_ttl(Some("2592001")), Err(Error::Parse(_))));
    }

    #[test]
    fn test_session_ttl_bounds() {
        assert_eq!(session_ttl(" 60 ").unwrap(), 60);
        assert_eq!(session_ttl("-1").unwrap(), -1);
        assert_eq!(session_ttl("31536000").unwrap(), MAX_SESSION_TTL_SECONDS);
        assert!(matches!(session_ttl("31536001"), Err(Error::Parse(_))));
        assert!(matches!(session_ttl("10000000000000"), Err(Error::Parse(_))));
        assert!(matches!(session_ttl("forever"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_remote_registry_is_bounded() {
        let mut config = SfdConfig::default();
        config.cache.max_remote_caches = 2;
        let c = RequestCoordinator::with_clock(config, Arc::new(ManualClock::new(Utc::now())));

        for port in 0..10 {
            c.cache_for(Some(&format!("127.0.0.1:{}", 20000 + port))).unwrap();
            assert!(c.remote_caches.len() <= 2);
        }
        let last = c.cache_for(Some("127.0.0.1:20009")).unwrap();
        assert!(Arc::ptr_eq(&last, &c.cache_for(Some("127.0.0.1:20009")).unwrap()));
    }

    #[test]
    fn test_cache_registry_reuses_instances() {
        let c = coordinator();
        assert!(Arc::ptr_eq(&c.cache_for(None).unwrap(), c.local_cache()));
        assert!(Arc::ptr_eq(&c.cache_for(Some("  ")).unwrap(), c.local_cache()));

        let a = c.cache_for(Some("127.0.0.1:11211 127.0.0.1:11212")).unwrap();
        let b = c.cache_for(Some(" 127.0.0.1:11211\t127.0.0.1:11212 ")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.backend().describe().len(), 2);
    }

    #[test]
    fn test_bad_cache_address_is_parse_error() {
        let c = coordinator();
        assert!(matches!(c.cache_for(Some("localhost")), Err(Error::Parse(_))));
    }

    #[test]
    fn test_open_session_touches() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let c = RequestCoordinator::with_clock(SfdConfig::default(), clock.clone());
        let first = c.open_session(None);
        clock.advance_secs(5);
        let again = c.open_session(Some(&first.id));
        assert_eq!(again.id, first.id);
        assert_eq!(
            (again.last_accessed_at - first.last_accessed_at).num_seconds(),
            5
        );
    }
}
