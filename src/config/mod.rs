//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `COTRAIN_REALTIME` prefix and nested values use double underscores as separators.
//! Every value has a default, so an empty environment yields a working local setup.
//!
//! # Example
//!
//! ```no_run
//! use cotrain_realtime::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Event service at {}", config.connection.url);
//! ```

mod balance;
mod connection;
mod error;
mod history;
mod identity;
mod logging;
mod presence;

pub use balance::BalanceConfig;
pub use connection::ConnectionConfig;
pub use error::{ConfigError, ValidationError};
pub use history::HistoryConfig;
pub use identity::IdentityConfig;
pub use logging::LoggingConfig;
pub use presence::PresenceConfig;

use serde::Deserialize;

use crate::application::ConnectionSettings;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Event service location and reconnect policy
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Shared history buffer sizes
    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub presence: PresenceConfig,

    #[serde(default)]
    pub balance: BalanceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Identity for the standalone binary
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `COTRAIN_REALTIME` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `COTRAIN_REALTIME__CONNECTION__URL=wss://...` -> `connection.url = ...`
    /// - `COTRAIN_REALTIME__BALANCE__REFRESH_INTERVAL_SECS=60` -> `balance.refresh_interval_secs = 60`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("COTRAIN_REALTIME")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.validate()?;
        self.history.validate()?;
        self.presence.validate()?;
        self.balance.validate()?;
        self.identity.validate()?;
        Ok(())
    }

    /// Settings for the shared `TransportConnection`.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            reconnect: self.connection.reconnect_policy(),
            connect_timeout: self.connection.connect_timeout(),
            notification_capacity: self.history.notification_capacity,
            session_update_capacity: self.history.session_update_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 5] = [
        "COTRAIN_REALTIME__CONNECTION__URL",
        "COTRAIN_REALTIME__CONNECTION__MAX_RECONNECT_ATTEMPTS",
        "COTRAIN_REALTIME__HISTORY__NOTIFICATION_CAPACITY",
        "COTRAIN_REALTIME__IDENTITY__WALLET_ADDRESS",
        "COTRAIN_REALTIME__LOGGING__JSON",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_with_empty_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = AppConfig::load();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.connection.url, "ws://localhost:3001");
        assert!(config.identity.identity().is_none());
        assert!(config.validate().is_ok());
        assert_eq!(config.connection_settings(), ConnectionSettings::default());
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("COTRAIN_REALTIME__CONNECTION__URL", "wss://events.cotrain.dev");
        env::set_var("COTRAIN_REALTIME__CONNECTION__MAX_RECONNECT_ATTEMPTS", "3");
        env::set_var("COTRAIN_REALTIME__HISTORY__NOTIFICATION_CAPACITY", "5");
        env::set_var("COTRAIN_REALTIME__IDENTITY__WALLET_ADDRESS", "0xabc");
        env::set_var("COTRAIN_REALTIME__LOGGING__JSON", "true");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.connection.url, "wss://events.cotrain.dev");
        assert_eq!(config.connection_settings().reconnect.max_attempts, 3);
        assert_eq!(config.connection_settings().notification_capacity, 5);
        assert_eq!(config.identity.identity().unwrap().wallet_address, "0xabc");
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_url_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("COTRAIN_REALTIME__CONNECTION__URL", "localhost:3001");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.validate(), Err(ValidationError::InvalidConnectionUrl));
    }
}
