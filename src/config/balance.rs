//! Balance monitor configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::BalanceSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_min_fetch_interval")]
    pub min_fetch_interval_secs: u64,

    /// Age after which a cached balance is discarded
    #[serde(default = "default_cache_expiry")]
    pub cache_expiry_secs: u64,
}

impl BalanceConfig {
    pub fn settings(&self) -> BalanceSettings {
        BalanceSettings {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            min_fetch_interval: Duration::from_secs(self.min_fetch_interval_secs),
            cache_expiry: Duration::from_secs(self.cache_expiry_secs),
        }
    }

    /// Validate balance configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.refresh_interval_secs == 0
            || self.min_fetch_interval_secs > self.refresh_interval_secs
            || self.refresh_interval_secs > self.cache_expiry_secs
        {
            return Err(ValidationError::InvalidBalanceIntervals);
        }
        Ok(())
    }
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            min_fetch_interval_secs: default_min_fetch_interval(),
            cache_expiry_secs: default_cache_expiry(),
        }
    }
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_min_fetch_interval() -> u64 {
    5
}

fn default_cache_expiry() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_defaults() {
        let config = BalanceConfig::default();
        assert_eq!(config.settings(), BalanceSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_intervals_must_be_ordered() {
        let config = BalanceConfig {
            min_fetch_interval_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidBalanceIntervals));

        let config = BalanceConfig {
            cache_expiry_secs: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
