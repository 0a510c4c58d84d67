//! SFDaaS HTTP boundary: axum routes over the request coordinator.

pub mod routes;
pub mod state;

pub use state::AppState;
