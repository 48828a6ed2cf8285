use std::time::Duration;

use ephchat_shared::constants::{DEFAULT_ADMIN_NAME, DEFAULT_SWEEP_INTERVAL};
use ephchat_shared::RetentionPolicy;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sender name that marks a message as coming from the admin.
    pub admin_name: String,
    /// How often the active thread is swept for expired records.
    pub sweep_interval: Duration,
    pub retention: RetentionPolicy,
    /// Capacity of the outgoing event queue.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admin_name: DEFAULT_ADMIN_NAME.to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            retention: RetentionPolicy::default(),
            event_capacity: 256,
        }
    }
}
