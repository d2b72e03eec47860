//! Shared history buffer sizes

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::realtime::{NOTIFICATION_HISTORY_CAPACITY, SESSION_UPDATE_HISTORY_CAPACITY};

const MAX_CAPACITY: usize = 1000;

/// History retained by the shared connection
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    #[serde(default = "default_session_update_capacity")]
    pub session_update_capacity: usize,
}

impl HistoryConfig {
    /// Validate history configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        for capacity in [self.notification_capacity, self.session_update_capacity] {
            if capacity == 0 || capacity > MAX_CAPACITY {
                return Err(ValidationError::InvalidCapacity { max: MAX_CAPACITY });
            }
        }
        Ok(())
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            notification_capacity: default_notification_capacity(),
            session_update_capacity: default_session_update_capacity(),
        }
    }
}

fn default_notification_capacity() -> usize {
    NOTIFICATION_HISTORY_CAPACITY
}

fn default_session_update_capacity() -> usize {
    SESSION_UPDATE_HISTORY_CAPACITY
}
