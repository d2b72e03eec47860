//! Logging configuration

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info,cotrain_realtime=debug".to_string()
}
