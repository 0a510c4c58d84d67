//! A single client session.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Longest inactivity TTL a client may request (one year).
pub const MAX_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Client session with a sliding inactivity window.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastAccessedAt")]
    pub last_accessed_at: DateTime<Utc>,
    /// Inactivity TTL in seconds; zero or negative never expires.
    #[serde(rename = "ttlSeconds")]
    pub ttl_seconds: i64,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Session {
    pub fn new(id: String, now: DateTime<Utc>, ttl_seconds: i64) -> Self {
        Self {
            id,
            created_at: now,
            last_accessed_at: now,
            ttl_seconds,
            attributes: HashMap::new(),
        }
    }

    /// Expired once more than `ttl_seconds` have passed since the last access.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// Instant after which the session is gone, if it can expire at all.
    ///
    /// A TTL too large to represent as a date never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.ttl_seconds <= 0 {
            return None;
        }
        Duration::try_seconds(self.ttl_seconds)
            .and_then(|ttl| self.last_accessed_at.checked_add_signed(ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let t0 = Utc::now();
        let s = Session::new("abc".into(), t0, 10);
        assert!(!s.is_expired(t0 + Duration::seconds(10)));
        assert!(s.is_expired(t0 + Duration::milliseconds(10_001)));
        assert_eq!(s.expires_at(), Some(t0 + Duration::seconds(10)));
    }

    #[test]
    fn test_non_positive_ttl_never_expires() {
        let t0 = Utc::now();
        for ttl in [0, -1] {
            let s = Session::new("abc".into(), t0, ttl);
            assert!(!s.is_expired(t0 + Duration::days(365)));
            assert!(s.expires_at().is_none());
        }
    }

    #[test]
    fn test_unrepresentable_ttl_never_expires() {
        let t0 = Utc::now();
        for ttl in [10_000_000_000_000, 9_300_000_000_000_000, i64::MAX] {
            let s = Session::new("abc".into(), t0, ttl);
            assert!(s.expires_at().is_none());
            assert!(!s.is_expired(t0 + Duration::days(365)));
        }
    }
}
