//! Service configuration, built once at startup and passed down explicitly.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Earth gravitational parameter (m³/s²), EGM96 / Orekit value.
pub const EARTH_GM: f64 = 3.986004415e14;

/// Ten Julian years in seconds.
const DEFAULT_MAX_SPAN_SECONDS: f64 = 10.0 * 365.25 * 86400.0;

/// Numerical propagator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagatorConfig {
    /// Nominal RK4 step magnitude in seconds.
    pub step_seconds: f64,
    /// Largest |tf − t0| accepted, in seconds.
    pub max_span_seconds: f64,
    /// Gravitational parameter of the central body (m³/s²).
    pub gm: f64,
    /// Positions shorter than this (meters) are degenerate.
    pub min_radius: f64,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            step_seconds: 60.0,
            max_span_seconds: DEFAULT_MAX_SPAN_SECONDS,
            gm: EARTH_GM,
            min_radius: 1.0,
        }
    }
}

impl PropagatorConfig {
    /// Reject non-finite or non-positive numeric settings.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("SFD_STEP_SECONDS", self.step_seconds),
            ("SFD_MAX_SPAN_SECONDS", self.max_span_seconds),
            ("SFD_GM", self.gm),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL used when a request enables caching without `ct`.
    pub default_ttl_seconds: u32,
    /// Upper bound on every backend get/set.
    pub backend_timeout: Duration,
    /// Memcached addresses used when a request omits `ca`.
    pub default_addresses: Option<String>,
    /// Surface `CacheUnavailable` instead of failing open.
    pub required: bool,
    /// Entry cap of the in-process backend.
    pub local_max_entries: usize,
    /// Most distinct memcached server lists kept connected at once.
    pub max_remote_caches: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 60,
            backend_timeout: Duration::from_millis(500),
            default_addresses: None,
            required: false,
            local_max_entries: 10_000,
            max_remote_caches: 16,
        }
    }
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity TTL for new sessions, in seconds.
    pub default_ttl_seconds: i64,
    /// Period of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 1800,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Top-level SFDaaS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfdConfig {
    /// HTTP server port.
    pub port: u16,
    /// URL prefix every route lives under (always starts with `/`).
    pub context_path: String,
    /// Principal identity folded into default cache fingerprints.
    pub principal: String,
    pub propagator: PropagatorConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
}

impl Default for SfdConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            context_path: "/SFDaaS".to_string(),
            principal: "anonymous".to_string(),
            propagator: PropagatorConfig::default(),
            cache: CacheConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl SfdConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = env_parse("PORT")?.unwrap_or(defaults.port);
        let context_path = normalize_context_path(
            &std::env::var("SFD_CONTEXT_PATH").unwrap_or(defaults.context_path),
        );
        let principal = std::env::var("SFD_PRINCIPAL")
            .or_else(|_| std::env::var("USER"))
            .unwrap_or(defaults.principal);

        let propagator = PropagatorConfig {
            step_seconds: env_parse("SFD_STEP_SECONDS")?
                .unwrap_or(defaults.propagator.step_seconds),
            max_span_seconds: env_parse("SFD_MAX_SPAN_SECONDS")?
                .unwrap_or(defaults.propagator.max_span_seconds),
            gm: env_parse("SFD_GM")?.unwrap_or(defaults.propagator.gm),
            ..defaults.propagator
        };
        propagator.validate()?;

        let cache = CacheConfig {
            backend_timeout: env_parse::<u64>("SFD_CACHE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache.backend_timeout),
            default_addresses: std::env::var("SFD_CACHE_ADDR")
                .ok()
                .filter(|a| !a.trim().is_empty()),
            required: env_parse::<u8>("SFD_CACHE_REQUIRED")?
                .map(|v| v == 1)
                .unwrap_or(defaults.cache.required),
            local_max_entries: env_parse("SFD_CACHE_LOCAL_MAX_ENTRIES")?
                .unwrap_or(defaults.cache.local_max_entries),
            ..defaults.cache
        };
        if cache.local_max_entries == 0 {
            return Err(Error::Config(
                "SFD_CACHE_LOCAL_MAX_ENTRIES must be at least 1".to_string(),
            ));
        }

        let config = Self {
            port,
            context_path,
            principal,
            propagator,
            cache,
            session: defaults.session,
        };
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }
}

/// Ensure the context path begins with `/` and carries no trailing slash.
pub fn normalize_context_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_context_path() {
        assert_eq!(normalize_context_path("SFDaaS"), "/SFDaaS");
        assert_eq!(normalize_context_path("/SFDaaS/"), "/SFDaaS");
        assert_eq!(normalize_context_path("/"), "");
    }

    #[test]
    fn test_defaults() {
        let config = SfdConfig::default();
        assert_eq!(config.propagator.step_seconds, 60.0);
        assert_eq!(config.cache.default_ttl_seconds, 60);
        assert_eq!(config.session.default_ttl_seconds, 1800);
        assert_eq!(config.session.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.cache.local_max_entries, 10_000);
        assert!(config.propagator.validate().is_ok());
    }

    #[test]
    fn test_propagator_rejects_non_finite_limits() {
        let span_nan = PropagatorConfig {
            max_span_seconds: f64::NAN,
            ..PropagatorConfig::default()
        };
        assert!(matches!(span_nan.validate(), Err(Error::Config(_))));

        let negative_gm = PropagatorConfig {
            gm: -1.0,
            ..PropagatorConfig::default()
        };
        assert!(matches!(negative_gm.validate(), Err(Error::Config(_))));

        let infinite_step = PropagatorConfig {
            step_seconds: f64::INFINITY,
            ..PropagatorConfig::default()
        };
        assert!(matches!(infinite_step.validate(), Err(Error::Config(_))));
    }
}
