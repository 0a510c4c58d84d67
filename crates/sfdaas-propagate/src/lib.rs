//! SFDaaS Propagate: numerical two-body state propagation.
//!
//! `StatePropagator` integrates dr/dt = v, dv/dt = −GM·r/|r|³ with a classical
//! fixed-step Runge–Kutta 4 scheme. It holds no shared state: one instance can
//! be used from any number of threads at once.

pub mod propagator;

pub use propagator::{two_body_acceleration, Propagation, StatePropagator};
