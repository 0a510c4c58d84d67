//! Cartesian orbital state.
//!
//! Position and velocity are expressed in a fixed inertial frame centered on
//! the attracting body (J2000 Earth-centered for the hosted service).

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Position (m), velocity (m/s) and epoch of a spacecraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StateRecord", into = "StateRecord")]
pub struct OrbitalState {
    pub epoch: DateTime<Utc>,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl OrbitalState {
    /// Build a state, rejecting non-finite components.
    pub fn new(
        epoch: DateTime<Utc>,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    ) -> Result<Self> {
        if !position.iter().chain(velocity.iter()).all(|c| c.is_finite()) {
            return Err(Error::Domain(
                "state vector components must be finite".to_string(),
            ));
        }
        Ok(Self {
            epoch,
            position,
            velocity,
        })
    }

    /// Distance from the central body (m).
    pub fn radius(&self) -> f64 {
        self.position.norm()
    }

    /// Speed (m/s).
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Specific orbital energy v²/2 − GM/r (J/kg).
    pub fn specific_energy(&self, gm: f64) -> f64 {
        0.5 * self.velocity.norm_squared() - gm / self.radius()
    }

    /// Specific angular momentum r × v (m²/s).
    pub fn angular_momentum(&self) -> Vector3<f64> {
        self.position.cross(&self.velocity)
    }
}

/// Stable textual form used for cache entries. Field order is fixed by the
/// struct; decoders are keyed by name and therefore order-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateRecord {
    epoch: DateTime<Utc>,
    position: [f64; 3],
    velocity: [f64; 3],
}

impl From<OrbitalState> for StateRecord {
    fn from(state: OrbitalState) -> Self {
        Self {
            epoch: state.epoch,
            position: state.position.into(),
            velocity: state.velocity.into(),
        }
    }
}

impl TryFrom<StateRecord> for OrbitalState {
    type Error = Error;

    fn try_from(record: StateRecord) -> Result<Self> {
        OrbitalState::new(
            record.epoch,
            Vector3::from(record.position),
            Vector3::from(record.velocity),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> OrbitalState {
        OrbitalState::new(
            Utc.with_ymd_and_hms(2010, 5, 28, 12, 0, 0).unwrap(),
            Vector3::new(3198022.67, 2901879.73, 5142928.95),
            Vector3::new(-6129.640631, 4489.647187, 1284.511245),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_non_finite() {
        let err = OrbitalState::new(
            Utc::now(),
            Vector3::new(f64::NAN, 0.0, 0.0),
            Vector3::zeros(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Domain(_)));
    }

    #[test]
    fn test_json_shape_and_decode() {
        let state = sample();
        let json = serde_json::to_value(&state).unwrap();
        assert!(json["epoch"].is_string());
        assert_eq!(json["position"].as_array().unwrap().len(), 3);

        // Key order on input does not matter.
        let reordered = serde_json::json!({
            "velocity": json["velocity"],
            "position": json["position"],
            "epoch": json["epoch"],
        });
        let decoded: OrbitalState = serde_json::from_value(reordered).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_radius_and_energy() {
        let state = sample();
        assert!((state.radius() - 6_715_502.45).abs() < 1.0);
        assert!(state.specific_energy(crate::config::EARTH_GM) < 0.0);
    }
}
