//! Fixed-step RK4 integration of two-body motion.

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::Serialize;
use sfdaas_core::{Error, OrbitalState, PropagatorConfig, Result};
use tracing::debug;

/// Remainders shorter than this fraction of a step are treated as zero.
const REMAINDER_EPSILON: f64 = 1e-9;

/// Outcome of one propagation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Propagation {
    /// State at the target epoch.
    pub state: OrbitalState,
    /// RK4 steps taken, including a final partial step.
    pub steps: u64,
}

/// Two-body acceleration −GM·r/|r|³.
#[inline]
pub fn two_body_acceleration(position: &Vector3<f64>, gm: f64) -> Vector3<f64> {
    let r = position.norm();
    position * (-gm / (r * r * r))
}

/// Deterministic fixed-step propagator.
#[derive(Debug, Clone)]
pub struct StatePropagator {
    config: PropagatorConfig,
}

impl StatePropagator {
    pub fn new(config: PropagatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PropagatorConfig {
        &self.config
    }

    /// Propagate `initial` to `target`.
    ///
    /// Takes ⌊|Δt|/h⌋ full steps followed by one partial step for any
    /// remainder, so the result lands exactly on `target`. Backward
    /// propagation uses a negative step.
    ///
    /// # Errors
    ///
    /// - `Domain` if |r0| is below the configured minimum radius, or the
    ///   trajectory passes through the central body.
    /// - `LimitExceeded` if |Δt| exceeds the configured span, checked before
    ///   any integration.
    pub fn propagate(&self, initial: &OrbitalState, target: DateTime<Utc>) -> Result<Propagation> {
        let radius = initial.radius();
        if !(radius >= self.config.min_radius) {
            return Err(Error::Domain(format!(
                "initial position magnitude {} m is below {} m",
                radius, self.config.min_radius
            )));
        }

        let span = seconds_between(initial.epoch, target);
        if span.abs() > self.config.max_span_seconds {
            return Err(Error::LimitExceeded(format!(
                "propagation span {:.3} s exceeds maximum {:.3} s",
                span.abs(),
                self.config.max_span_seconds
            )));
        }

        if span == 0.0 {
            return Ok(Propagation {
                state: initial.clone(),
                steps: 0,
            });
        }

        let h = self.config.step_seconds.abs().copysign(span);
        let full_steps = (span.abs() / h.abs()).floor() as u64;
        let remainder = span.abs() - full_steps as f64 * h.abs();

        let gm = self.config.gm;
        let mut r = initial.position;
        let mut v = initial.velocity;
        for _ in 0..full_steps {
            (r, v) = rk4_step(&r, &v, h, gm);
        }

        let mut steps = full_steps;
        if remainder > REMAINDER_EPSILON * h.abs() {
            (r, v) = rk4_step(&r, &v, remainder.copysign(span), gm);
            steps += 1;
        }

        debug!(
            "Propagated {:.3} s in {} steps (h={} s)",
            span, steps, h
        );

        let state = OrbitalState::new(target, r, v).map_err(|_| {
            Error::Domain("trajectory passed through the central body".to_string())
        })?;
        Ok(Propagation { state, steps })
    }
}

/// One classical Runge–Kutta 4 step of size `h` (may be negative).
fn rk4_step(
    r: &Vector3<f64>,
    v: &Vector3<f64>,
    h: f64,
    gm: f64,
) -> (Vector3<f64>, Vector3<f64>) {
    let half = 0.5 * h;

    let k1r = *v;
    let k1v = two_body_acceleration(r, gm);

    let k2r = v + half * k1v;
    let k2v = two_body_acceleration(&(r + half * k1r), gm);

    let k3r = v + half * k2v;
    let k3v = two_body_acceleration(&(r + half * k2r), gm);

    let k4r = v + h * k3v;
    let k4v = two_body_acceleration(&(r + h * k3r), gm);

    let sixth = h / 6.0;
    (
        r + sixth * (k1r + 2.0 * k2r + 2.0 * k3r + k4r),
        v + sixth * (k1v + 2.0 * k2v + 2.0 * k3v + k4v),
    )
}

/// Signed seconds from `from` to `to`, with nanosecond resolution where it fits.
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to.signed_duration_since(from);
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}
