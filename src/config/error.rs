//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Event service URL must use ws, wss, http or https")]
    InvalidConnectionUrl,

    #[error("Invalid connect timeout")]
    InvalidTimeout,

    #[error("Reconnect base delay must be positive and not exceed the max delay")]
    InvalidBackoff,

    #[error("History capacity must be between 1 and {max}")]
    InvalidCapacity { max: usize },

    #[error("Balance intervals must satisfy min_fetch <= refresh <= cache_expiry")]
    InvalidBalanceIntervals,

    #[error("Invalid session id in identity.sessions: {0:?}")]
    InvalidSessionId(String),
}
