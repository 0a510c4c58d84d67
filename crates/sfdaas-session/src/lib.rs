//! SFDaaS Session: per-client sessions with sliding inactivity TTL.

pub mod session;
pub mod store;

pub use session::{Session, MAX_TTL_SECONDS};
pub use store::SessionStore;
