//! Cache key derivation.

use chrono::{DateTime, SecondsFormat, Utc};
use nalgebra::Vector3;
use sha2::{Digest, Sha256};

/// Prefix for derived keys, so they never collide with caller-chosen ones
/// that happen to be bare hex.
const KEY_PREFIX: &str = "sfd:";

/// The request identity a default fingerprint is built from.
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    pub principal: &'a str,
    pub session_id: &'a str,
    pub t0: DateTime<Utc>,
    pub r0: &'a Vector3<f64>,
    pub v0: &'a Vector3<f64>,
    pub tf: DateTime<Utc>,
}

impl FingerprintInput<'_> {
    /// Stable key: SHA-256 over the canonical parsed values.
    ///
    /// Uses parsed values rather than raw text, so `[1.0,2,3]` and
    /// `[ 1, 2.0, 3 ]` address the same entry. Every field is length-prefixed,
    /// so no choice of principal or session id can shift a field boundary.
    pub fn key(&self) -> String {
        let fields = [
            self.principal.to_string(),
            self.session_id.to_string(),
            self.t0.to_rfc3339_opts(SecondsFormat::Nanos, true),
            format!("{:?},{:?},{:?}", self.r0.x, self.r0.y, self.r0.z),
            format!("{:?},{:?},{:?}", self.v0.x, self.v0.y, self.v0.z),
            self.tf.to_rfc3339_opts(SecondsFormat::Nanos, true),
        ];

        let mut hasher = Sha256::new();
        for field in &fields {
            hasher.update(format!("{}:", field.len()).as_bytes());
            hasher.update(field.as_bytes());
        }
        format!("{}{}", KEY_PREFIX, hex::encode(hasher.finalize()))
    }
}

/// An explicit key, when given, replaces the derived one entirely.
pub fn resolve_key(explicit: Option<&str>, input: &FingerprintInput<'_>) -> String {
    match explicit {
        Some(key) => key.to_string(),
        None => input.key(),
    }
}
