//! Client → server commands.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::SessionId;

/// Commands the client sends over the shared connection.
///
/// Serialized as `{"event": "<name>", "data": {"sessionId": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum OutboundCommand {
    /// Join a session room.
    JoinSession(SessionRef),
    /// Leave a session room.
    LeaveSession(SessionRef),
    /// Ask for a point-in-time `sessionInfo` snapshot.
    GetSessionInfo(SessionRef),
}

/// Payload shared by every session command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub session_id: SessionId,
}

impl OutboundCommand {
    pub fn join(session_id: &SessionId) -> Self {
        Self::JoinSession(SessionRef {
            session_id: session_id.clone(),
        })
    }

    pub fn leave(session_id: &SessionId) -> Self {
        Self::LeaveSession(SessionRef {
            session_id: session_id.clone(),
        })
    }

    pub fn session_info(session_id: &SessionId) -> Self {
        Self::GetSessionInfo(SessionRef {
            session_id: session_id.clone(),
        })
    }

    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinSession(_) => "joinSession",
            Self::LeaveSession(_) => "leaveSession",
            Self::GetSessionInfo(_) => "getSessionInfo",
        }
    }

    /// The session this command targets.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::JoinSession(r) | Self::LeaveSession(r) | Self::GetSessionInfo(r) => &r.session_id,
        }
    }
}
