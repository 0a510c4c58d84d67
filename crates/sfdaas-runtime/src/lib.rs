//! Runtime coordinator. Ties sessions, the fingerprint cache and the
//! propagator together for one inbound request.

pub mod coordinator;
pub mod types;

pub use coordinator::{Handled, RequestCoordinator};
pub use types::*;
