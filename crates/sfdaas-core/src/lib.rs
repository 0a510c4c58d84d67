//! SFDaaS Core: errors, configuration, orbital state and text codecs.

pub mod clock;
pub mod config;
pub mod error;
pub mod parse;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, PropagatorConfig, SessionConfig, SfdConfig};
pub use error::{Error, Result};
pub use state::OrbitalState;
