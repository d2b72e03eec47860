//! Server → client events received on the shared connection.
//!
//! Payload field names follow the event service's camelCase JSON.
//! Fields the service may omit fall back to defaults instead of failing
//! the whole message.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{SessionId, Timestamp};

/// Wire names of every inbound event.
pub mod names {
    pub const CONNECTED: &str = "connected";
    pub const SESSION_UPDATE: &str = "sessionUpdate";
    pub const SESSION_INFO: &str = "sessionInfo";
    pub const SESSION_JOINED: &str = "sessionJoined";
    pub const SESSION_LEFT: &str = "sessionLeft";
    pub const NOTIFICATION: &str = "notification";
    pub const ANNOUNCEMENT: &str = "announcement";
    pub const REWARD_UPDATE: &str = "rewardUpdate";
    pub const TRANSACTION_UPDATE: &str = "transactionUpdate";
    pub const SESSION_LIST_UPDATE: &str = "sessionListUpdate";
    pub const ERROR: &str = "error";
    pub const DISCONNECT: &str = "disconnect";
}

/// Every event the shared connection can deliver to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ConnectionAck(ConnectionAck),
    SessionUpdate(SessionUpdate),
    SessionInfo(SessionInfo),
    SessionJoined(SessionJoined),
    SessionLeft(SessionLeft),
    Notification(Notification),
    Announcement(Announcement),
    RewardUpdate(OpaqueEvent),
    TransactionUpdate(OpaqueEvent),
    SessionListUpdate(OpaqueEvent),
    ServerError(ServerError),
    Disconnect(DisconnectNotice),
}

impl InboundEvent {
    /// Wire name, used as the dispatcher key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionAck(_) => names::CONNECTED,
            Self::SessionUpdate(_) => names::SESSION_UPDATE,
            Self::SessionInfo(_) => names::SESSION_INFO,
            Self::SessionJoined(_) => names::SESSION_JOINED,
            Self::SessionLeft(_) => names::SESSION_LEFT,
            Self::Notification(_) => names::NOTIFICATION,
            Self::Announcement(_) => names::ANNOUNCEMENT,
            Self::RewardUpdate(_) => names::REWARD_UPDATE,
            Self::TransactionUpdate(_) => names::TRANSACTION_UPDATE,
            Self::SessionListUpdate(_) => names::SESSION_LIST_UPDATE,
            Self::ServerError(_) => names::ERROR,
            Self::Disconnect(_) => names::DISCONNECT,
        }
    }

    /// Event time: the server's timestamp when the payload carries one,
    /// otherwise the local receive time.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::ConnectionAck(e) => e.received_at,
            Self::SessionUpdate(e) => e.timestamp,
            Self::SessionInfo(e) => e.received_at,
            Self::SessionJoined(e) => e.timestamp,
            Self::SessionLeft(e) => e.timestamp,
            Self::Notification(e) => e.timestamp,
            Self::Announcement(e) => e.timestamp,
            Self::RewardUpdate(e) | Self::TransactionUpdate(e) | Self::SessionListUpdate(e) => {
                e.received_at
            }
            Self::ServerError(e) => e.received_at,
            Self::Disconnect(e) => e.received_at,
        }
    }

    /// Room the event belongs to, for session-scoped events.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::SessionUpdate(e) => Some(&e.session_id),
            Self::SessionInfo(e) => Some(&e.session_id),
            Self::SessionJoined(e) => Some(&e.session_id),
            Self::SessionLeft(e) => Some(&e.session_id),
            _ => None,
        }
    }
}

/// `connected` - the service accepted our identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAck {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(skip, default = "Timestamp::now")]
    pub received_at: Timestamp,
}

/// Kind of change reported by a `sessionUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionUpdateType {
    ParticipantJoined,
    ParticipantLeft,
    SessionUpdated,
    SessionCompleted,
    RewardDistributed,
}

impl SessionUpdateType {
    pub fn is_participant_change(&self) -> bool {
        matches!(self, Self::ParticipantJoined | Self::ParticipantLeft)
    }

    pub fn is_status_change(&self) -> bool {
        matches!(self, Self::SessionUpdated | Self::SessionCompleted)
    }

    pub fn is_reward(&self) -> bool {
        matches!(self, Self::RewardDistributed)
    }
}

/// `sessionUpdate` - something happened inside a training session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub session_id: SessionId,
    #[serde(rename = "type")]
    pub update_type: SessionUpdateType,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default = "Timestamp::now")]
    pub timestamp: Timestamp,
}

impl SessionUpdate {
    /// `data.participantCount`, when the server included it.
    pub fn participant_count(&self) -> Option<u32> {
        self.data
            .get("participantCount")
            .and_then(|v| v.as_u64())
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
    }
}

/// `sessionInfo` - point-in-time snapshot answering `getSessionInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    #[serde(default)]
    pub participant_count: u32,
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default)]
    pub last_activity: Option<Timestamp>,
    #[serde(skip, default = "Timestamp::now")]
    pub received_at: Timestamp,
}

/// `sessionJoined` - the server confirmed our room membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionJoined {
    pub session_id: SessionId,
    #[serde(default)]
    pub participant_count: Option<u32>,
    #[serde(default = "Timestamp::now")]
    pub timestamp: Timestamp,
}

/// `sessionLeft` - the server confirmed we left a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLeft {
    pub session_id: SessionId,
    #[serde(default = "Timestamp::now")]
    pub timestamp: Timestamp,
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// `notification` - user-facing message for the notification tray.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default = "Timestamp::now")]
    pub timestamp: Timestamp,
}

/// `announcement` - broadcast message, shown as a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default = "Timestamp::now")]
    pub timestamp: Timestamp,
}

impl From<Announcement> for Notification {
    fn from(a: Announcement) -> Self {
        Notification {
            kind: a.kind,
            title: a.title,
            message: a.message,
            data: None,
            timestamp: a.timestamp,
        }
    }
}

/// Payload forwarded verbatim (`rewardUpdate`, `transactionUpdate`,
/// `sessionListUpdate`).
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueEvent {
    pub data: serde_json::Value,
    pub received_at: Timestamp,
}

/// `error` - server-reported problem; does not close the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default = "unknown_error")]
    pub message: String,
    #[serde(skip, default = "Timestamp::now")]
    pub received_at: Timestamp,
}

/// `disconnect` - the server is dropping us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectNotice {
    #[serde(default = "unknown_reason")]
    pub reason: String,
    #[serde(skip, default = "Timestamp::now")]
    pub received_at: Timestamp,
}

fn unknown_error() -> String {
    "Unknown error".to_string()
}

fn unknown_reason() -> String {
    "unknown".to_string()
}
