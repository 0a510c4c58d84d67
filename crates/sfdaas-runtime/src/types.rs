//! Request and report types.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sfdaas_session::Session;

/// Raw propagation parameters as they arrive from the boundary.
///
/// Values stay as text; the coordinator owns parsing so every failure maps
/// onto one error taxonomy.
#[derive(Debug, Clone, Default)]
pub struct PropagationRequest {
    /// Session id carried by the client, if any.
    pub session_id: Option<String>,
    /// Overrides the configured principal for fingerprinting.
    pub principal: Option<String>,
    pub t0: Option<String>,
    pub tf: Option<String>,
    pub r0: Option<String>,
    pub v0: Option<String>,
    /// Cache flag, `1` enables caching.
    pub cf: Option<String>,
    /// Whitespace-separated memcached addresses.
    pub ca: Option<String>,
    /// Cache TTL in seconds.
    pub ct: Option<String>,
    /// Explicit cache key.
    pub ck: Option<String>,
    /// Cache-required flag, `1` disables fail-open.
    pub cr: Option<String>,
    /// Session flag; when present `st` is applied.
    pub sf: Option<String>,
    /// Session inactivity TTL in seconds.
    pub st: Option<String>,
}

impl PropagationRequest {
    /// Build from decoded query parameters.
    pub fn from_params(session_id: Option<String>, params: &HashMap<String, String>) -> Self {
        let get = |name: &str| params.get(name).cloned();
        Self {
            session_id,
            principal: None,
            t0: get("t0"),
            tf: get("tf"),
            r0: get("r0"),
            v0: get("v0"),
            cf: get("cf"),
            ca: get("ca"),
            ct: get("ct"),
            ck: get("ck"),
            cr: get("cr"),
            sf: get("sf"),
            st: get("st"),
        }
    }
}

/// Successful propagation response.
#[derive(Debug, Clone, Serialize)]
pub struct PropagationReport {
    pub status: &'static str,
    pub data: ReportData,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub apriori: Apriori,
    pub aposteriori: Aposteriori,
}

/// Initial state, echoed as the client sent it.
#[derive(Debug, Clone, Serialize)]
pub struct Apriori {
    pub t0: String,
    pub r0: String,
    pub v0: String,
}

/// Final state in canonical rendering.
#[derive(Debug, Clone, Serialize)]
pub struct Aposteriori {
    pub tf: String,
    pub rf: String,
    pub vf: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub assumptions: BTreeMap<&'static str, &'static str>,
    pub timing: TimingInfo,
    pub caching: CachingInfo,
    pub session: SessionInfo,
    pub propagator: PropagatorInfo,
}

/// Assumptions the service makes about its inputs.
pub fn assumptions() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("1", "The epochs, t0 and tf, are assumed to be in UTC."),
        (
            "2",
            "The radius and velocity vectors are in meters and meters/second, respectively.",
        ),
        ("3", "The frame is assumed to be the J2000 Earth-centered one."),
    ])
}

#[derive(Debug, Clone, Serialize)]
pub struct TimingInfo {
    #[serde(rename = "runStart")]
    pub run_start: String,
    #[serde(rename = "runStop")]
    pub run_stop: String,
    #[serde(rename = "totalTimeMs")]
    pub total_time_ms: i64,
    /// Present only when this request ran the computation itself.
    #[serde(rename = "propagationStart", skip_serializing_if = "Option::is_none")]
    pub propagation_start: Option<String>,
    #[serde(rename = "propagationEnd", skip_serializing_if = "Option::is_none")]
    pub propagation_end: Option<String>,
    #[serde(rename = "propagationTimeMs", skip_serializing_if = "Option::is_none")]
    pub propagation_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CachingInfo {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit: Option<bool>,
    /// Joined a lookup or computation already in flight for the same key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<String>>,
    #[serde(rename = "retrievedAt", skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<String>,
    #[serde(rename = "storedAt", skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<String>,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(rename = "storeError", skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub jsessionid: String,
    pub created: String,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "creationTime")]
    pub creation_time: i64,
    #[serde(rename = "lastAccessed")]
    pub last_accessed: String,
    #[serde(rename = "lastAccessedTime")]
    pub last_accessed_time: i64,
    #[serde(rename = "maxInactiveInterval")]
    pub max_inactive_interval: i64,
    #[serde(rename = "expiryIn")]
    pub expiry_in: String,
    /// Absent when the session never expires.
    #[serde(rename = "expiryDate", skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            jsessionid: session.id.clone(),
            created: stamp(&session.created_at),
            creation_time: session.created_at.timestamp_millis(),
            last_accessed: stamp(&session.last_accessed_at),
            last_accessed_time: session.last_accessed_at.timestamp_millis(),
            max_inactive_interval: session.ttl_seconds,
            expiry_in: if session.ttl_seconds > 0 {
                format!("{} seconds", session.ttl_seconds)
            } else {
                "never".to_string()
            },
            expiry_date: session.expires_at().map(|t| stamp(&t)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropagatorInfo {
    #[serde(rename = "stepSeconds")]
    pub step_seconds: f64,
    pub gm: f64,
    /// Present only when this request ran the computation itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u64>,
}

/// Compact session summary for the usage endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(rename = "creationTime")]
    pub creation_time: i64,
    #[serde(rename = "lastAccessedTime")]
    pub last_accessed_time: i64,
    #[serde(rename = "maxInactiveInterval")]
    pub max_inactive_interval: i64,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            creation_time: session.created_at.timestamp_millis(),
            last_accessed_time: session.last_accessed_at.timestamp_millis(),
            max_inactive_interval: session.ttl_seconds,
        }
    }
}

/// Diagnostic timestamp, e.g. `2010-05-28T12:00:00.000 +0000`.
pub fn stamp(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3f %z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stamp_format() {
        let t = Utc.with_ymd_and_hms(2010, 5, 28, 12, 0, 0).unwrap();
        assert_eq!(stamp(&t), "2010-05-28T12:00:00.000 +0000");
    }

    #[test]
    fn test_from_params() {
        let params = HashMap::from([
            ("t0".to_string(), "2010-05-28T12:00:00.000".to_string()),
            ("cf".to_string(), "1".to_string()),
        ]);
        let req = PropagationRequest::from_params(Some("abc".into()), &params);
        assert_eq!(req.session_id.as_deref(), Some("abc"));
        assert_eq!(req.t0.as_deref(), Some("2010-05-28T12:00:00.000"));
        assert_eq!(req.cf.as_deref(), Some("1"));
        assert!(req.tf.is_none());
    }

    #[test]
    fn test_session_info_never_expiring() {
        let now = Utc::now();
        let session = Session::new("abc".into(), now, 0);
        let info = SessionInfo::from(&session);
        assert_eq!(info.expiry_in, "never");
        assert!(info.expiry_date.is_none());
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("expiryDate").is_none());
        assert_eq!(json["maxInactiveInterval"], 0);
    }
}
