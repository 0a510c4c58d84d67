//! Shared application state.

use sfdaas_core::SfdConfig;
use sfdaas_runtime::RequestCoordinator;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: SfdConfig,
    pub coordinator: RequestCoordinator,
}

impl AppState {
    pub fn new(config: SfdConfig) -> Self {
        let coordinator = RequestCoordinator::new(config.clone());
        Self {
            config,
            coordinator,
        }
    }

    /// Build around an existing coordinator (for testing).
    pub fn with_coordinator(coordinator: RequestCoordinator) -> Self {
        Self {
            config: coordinator.config().clone(),
            coordinator,
        }
    }
}
