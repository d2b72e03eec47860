//! Session presence configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::PresenceSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Updates kept in each presence view
    #[serde(default = "default_recent_update_limit")]
    pub recent_update_limit: usize,

    /// Delay before asking for a session snapshot after connecting
    #[serde(default = "default_info_request_delay")]
    pub info_request_delay_ms: u64,

    /// Window for `has_recent_activity`
    #[serde(default = "default_activity_window")]
    pub activity_window_secs: u64,
}

impl PresenceConfig {
    pub fn settings(&self) -> PresenceSettings {
        PresenceSettings {
            recent_update_limit: self.recent_update_limit,
            info_request_delay: Duration::from_millis(self.info_request_delay_ms),
            activity_window: Duration::from_secs(self.activity_window_secs),
        }
    }

    /// Validate presence configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.recent_update_limit == 0 || self.recent_update_limit > 1000 {
            return Err(ValidationError::InvalidCapacity { max: 1000 });
        }
        Ok(())
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            recent_update_limit: default_recent_update_limit(),
            info_request_delay_ms: default_info_request_delay(),
            activity_window_secs: default_activity_window(),
        }
    }
}

fn default_recent_update_limit() -> usize {
    10
}

fn default_info_request_delay() -> u64 {
    100
}

fn default_activity_window() -> u64 {
    60
}
