//! Event service connection configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::realtime::ReconnectPolicy;

/// Where the event service lives and how hard to try reaching it
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the event service (`ws`, `wss`, `http` or `https`)
    #[serde(default = "default_url")]
    pub url: String,

    /// Namespace path appended to the base URL
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Delay before the first reconnect, doubled on each failure
    #[serde(default = "default_base_delay")]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound for the reconnect delay
    #[serde(default = "default_max_delay")]
    pub max_reconnect_delay_ms: u64,

    /// Consecutive failures before giving up
    #[serde(default = "default_max_attempts")]
    pub max_reconnect_attempts: u32,

    /// Time allowed for opening one link
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.max_reconnect_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate connection configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("CONNECTION_URL"));
        }
        if !["ws://", "wss://", "http://", "https://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
        {
            return Err(ValidationError::InvalidConnectionUrl);
        }
        if self.namespace.trim_matches('/').is_empty() {
            return Err(ValidationError::MissingRequired("CONNECTION_NAMESPACE"));
        }
        if self.reconnect_base_delay_ms == 0
            || self.reconnect_base_delay_ms > self.max_reconnect_delay_ms
        {
            return Err(ValidationError::InvalidBackoff);
        }
        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > 60_000 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            namespace: default_namespace(),
            reconnect_base_delay_ms: default_base_delay(),
            max_reconnect_delay_ms: default_max_delay(),
            max_reconnect_attempts: default_max_attempts(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

fn default_url() -> String {
    "ws://localhost:3001".to_string()
}

fn default_namespace() -> String {
    "sessions".to_string()
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.url, "ws://localhost:3001");
        assert_eq!(config.namespace, "sessions");
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_urls_accepted() {
        let config = ConnectionConfig {
            url: "https://events.cotrain.dev".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let config = ConnectionConfig {
            url: "ftp://localhost".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidConnectionUrl));

        let config = ConnectionConfig {
            url: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::MissingRequired(_))));
    }

    #[test]
    fn test_validation_backoff() {
        let config = ConnectionConfig {
            reconnect_base_delay_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidBackoff));

        let config = ConnectionConfig {
            reconnect_base_delay_ms: 60_000,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidBackoff));
    }

    #[test]
    fn test_validation_timeout() {
        let config = ConnectionConfig {
            connect_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidTimeout));
    }
}
