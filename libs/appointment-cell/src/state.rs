use std::sync::Arc;

use shared_config::AppConfig;

use crate::services::lifecycle::AppointmentLifecycleService;

/// Shared handler state: configuration plus the single lifecycle service
/// instance owning all appointment and queue writes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub lifecycle: Arc<AppointmentLifecycleService>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, lifecycle: Arc<AppointmentLifecycleService>) -> Self {
        Self { config, lifecycle }
    }
}
