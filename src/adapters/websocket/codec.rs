//! Wire codec for the event service.
//!
//! Every frame in both directions is a JSON text message shaped as
//! `{"event": "<name>", "data": <payload>}`.
//!
//! - Malformed JSON or a missing `event` field → `CodecError::Malformed`
//! - Known event with a payload of the wrong shape → `CodecError::InvalidPayload`
//! - Unknown event name → `Ok(None)` (ignored by the connection)

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::Timestamp;
use crate::domain::realtime::events::names;
use crate::domain::realtime::{InboundEvent, OpaqueEvent, OutboundCommand};

/// Errors produced while decoding or encoding frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("invalid payload for '{event}': {reason}")]
    InvalidPayload { event: String, reason: String },

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

#[derive(Debug, Deserialize)]
struct IncomingFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct OutgoingFrame<'a> {
    event: &'a str,
    data: &'a Value,
}

/// Decode one text frame into an inbound event.
pub fn decode_frame(text: &str) -> Result<Option<InboundEvent>, CodecError> {
    let frame: IncomingFrame =
        serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;
    decode_event(&frame.event, frame.data)
}

/// Decode an already-split `(event, data)` pair.
pub fn decode_event(event: &str, data: Value) -> Result<Option<InboundEvent>, CodecError> {
    let decoded = match event {
        names::CONNECTED => InboundEvent::ConnectionAck(payload(event, data)?),
        names::SESSION_UPDATE => InboundEvent::SessionUpdate(payload(event, data)?),
        names::SESSION_INFO => InboundEvent::SessionInfo(payload(event, data)?),
        names::SESSION_JOINED => InboundEvent::SessionJoined(payload(event, data)?),
        names::SESSION_LEFT => InboundEvent::SessionLeft(payload(event, data)?),
        names::NOTIFICATION => InboundEvent::Notification(payload(event, data)?),
        names::ANNOUNCEMENT => InboundEvent::Announcement(payload(event, data)?),
        names::REWARD_UPDATE => InboundEvent::RewardUpdate(opaque(data)),
        names::TRANSACTION_UPDATE => InboundEvent::TransactionUpdate(opaque(data)),
        names::SESSION_LIST_UPDATE => InboundEvent::SessionListUpdate(opaque(data)),
        names::ERROR => InboundEvent::ServerError(payload(event, object_or_message(data))?),
        names::DISCONNECT => InboundEvent::Disconnect(payload(event, object_or_reason(data))?),
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

/// Encode an outbound command as a text frame.
pub fn encode_command(command: &OutboundCommand) -> Result<String, CodecError> {
    serde_json::to_string(command).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a client command frame. Used by servers and test doubles.
pub fn decode_command(text: &str) -> Result<OutboundCommand, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Encode an arbitrary `(event, data)` pair as a text frame.
pub fn encode_event(event: &str, data: &Value) -> Result<String, CodecError> {
    serde_json::to_string(&OutgoingFrame { event, data })
        .map_err(|e| CodecError::Encode(e.to_string()))
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, CodecError> {
    let data = match data {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(data).map_err(|e| CodecError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

fn opaque(data: Value) -> OpaqueEvent {
    OpaqueEvent {
        data,
        received_at: Timestamp::now(),
    }
}

// `error` and `disconnect` are sometimes sent with a bare string payload.
fn object_or_message(data: Value) -> Value {
    match data {
        Value::String(message) => serde_json::json!({ "message": message }),
        other => other,
    }
}

fn object_or_reason(data: Value) -> Value {
    match data {
        Value::String(reason) => serde_json::json!({ "reason": reason }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::SessionId;
    use crate::domain::realtime::{NotificationKind, SessionUpdateType};
    use serde_json::json;

    fn decode(value: Value) -> Option<InboundEvent> {
        decode_frame(&value.to_string()).unwrap()
    }

    #[test]
    fn decodes_session_update() {
        let event = decode(json!({
            "event": "sessionUpdate",
            "data": {
                "sessionId": "s1",
                "type": "participant_joined",
                "data": {"participantCount": 3},
                "timestamp": "2025-01-10T12:00:00Z"
            }
        }))
        .unwrap();

        match event {
            InboundEvent::SessionUpdate(update) => {
                assert_eq!(update.session_id.as_str(), "s1");
                assert_eq!(update.update_type, SessionUpdateType::ParticipantJoined);
                assert_eq!(update.participant_count(), Some(3));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn decodes_every_known_event_name() {
        let frames = [
            json!({"event": "connected", "data": {"userId": "u1"}}),
            json!({"event": "sessionUpdate", "data": {"sessionId": "s", "type": "session_updated"}}),
            json!({"event": "sessionInfo", "data": {"sessionId": "s", "participantCount": 2}}),
            json!({"event": "sessionJoined", "data": {"sessionId": "s"}}),
            json!({"event": "sessionLeft", "data": {"sessionId": "s"}}),
            json!({"event": "notification", "data": {"title": "t", "message": "m"}}),
            json!({"event": "announcement", "data": {"title": "t", "message": "m"}}),
            json!({"event": "rewardUpdate", "data": {"amount": 1}}),
            json!({"event": "transactionUpdate", "data": {"hash": "0x1"}}),
            json!({"event": "sessionListUpdate", "data": []}),
            json!({"event": "error", "data": {"message": "bad"}}),
            json!({"event": "disconnect", "data": "server shutdown"}),
        ];

        for frame in frames {
            let expected = frame["event"].as_str().unwrap().to_string();
            let event = decode(frame).unwrap();
            assert_eq!(event.name(), expected);
        }
    }

    #[test]
    fn notification_defaults_to_info() {
        let event = decode(json!({
            "event": "notification",
            "data": {"title": "Hi", "message": "there"}
        }))
        .unwrap();
        match event {
            InboundEvent::Notification(n) => assert_eq!(n.kind, NotificationKind::Info),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn missing_data_uses_payload_defaults() {
        let event = decode(json!({"event": "connected"})).unwrap();
        assert!(matches!(event, InboundEvent::ConnectionAck(ack) if ack.user_id.is_none()));
    }

    #[test]
    fn unknown_event_is_ignored() {
        assert!(decode(json!({"event": "mystery", "data": {}})).is_none());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            decode_frame("{not json"),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            decode_frame(r#"{"data": {}}"#),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_payload_shape_is_invalid_payload() {
        let err = decode_frame(r#"{"event":"sessionUpdate","data":{"type":"nope"}}"#).unwrap_err();
        match err {
            CodecError::InvalidPayload { event, .. } => assert_eq!(event, "sessionUpdate"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn blank_session_id_is_invalid_payload() {
        let err = decode_frame(
            r#"{"event":"sessionInfo","data":{"sessionId":"","participantCount":2}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidPayload { .. }));
    }

    #[test]
    fn bare_string_error_payload_becomes_message() {
        let event = decode(json!({"event": "error", "data": "rate limited"})).unwrap();
        match event {
            InboundEvent::ServerError(e) => assert_eq!(e.message, "rate limited"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn commands_encode_and_decode() {
        let sid = SessionId::new("room-7").unwrap();
        let text = encode_command(&OutboundCommand::leave(&sid)).unwrap();

        assert_eq!(text, r#"{"event":"leaveSession","data":{"sessionId":"room-7"}}"#);
        assert_eq!(decode_command(&text).unwrap(), OutboundCommand::leave(&sid));
    }

    #[test]
    fn encode_event_wraps_payload() {
        let text = encode_event("notification", &json!({"title": "a"})).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "notification");
        assert_eq!(value["data"]["title"], "a");
    }
}
