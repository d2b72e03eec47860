//! Connection lifecycle state owned by the transport connection.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::domain::foundation::{StateMachine, Timestamp};

/// Lifecycle status of the shared transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Opening the transport (first attempt or a reconnect).
    Connecting,
    /// Handshake completed; commands can be sent.
    Connected,
    /// No link. Either idle, explicitly disconnected, or waiting out a backoff.
    Disconnected,
    /// Reconnect attempts exhausted. Only an explicit `connect` leaves this state.
    Error,
}

impl StateMachine for ConnectionStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionStatus::*;
        match self {
            Disconnected => vec![Connecting, Error],
            Connecting => vec![Connected, Disconnected, Error],
            Connected => vec![Disconnected],
            Error => vec![Connecting, Disconnected],
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of the shared connection's state.
///
/// Consumers observe it as data; it never travels as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_connected_at: Option<Timestamp>,
    pub last_error: Option<String>,
    /// Consecutive failed attempts since the last successful connect.
    pub attempt: u32,
}

impl ConnectionState {
    /// Initial state: never connected.
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_connected_at: None,
            last_error: None,
            attempt: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.status == ConnectionStatus::Connecting
    }

    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }

    /// True when the connection gave up and needs a caller-initiated `connect`.
    pub fn is_terminal_error(&self) -> bool {
        self.status == ConnectionStatus::Error
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded exponential backoff: `min(base * 2^attempt, max_delay)`,
/// giving up after `max_attempts` consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before the reconnect that follows `attempt` failures.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}
