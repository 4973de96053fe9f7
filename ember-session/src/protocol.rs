//! JSON wire protocol for the room event stream.
//!
//! One envelope per WebSocket text frame:
//! ```text
//! { "type": "message_history", "username": "...", "messages": [...] }
//! { "type": "message", "id": "...", "username": "...", "contents": "...", "timestamp": "..." }
//! { "type": "user_joined", "username": "...", "timestamp": "..." }
//! { "type": "user_left",  "username": "...", "timestamp": "..." }
//! ```
//!
//! Dispatch over the `type` tag is exhaustive: an unknown kind fails
//! decoding instead of being silently ignored. A frame that fails to
//! decode is the sender's problem, never the session's — callers discard
//! it and keep reading.
//!
//! Timestamps are ISO8601, assigned by the server. The server is the
//! ordering authority; nothing here reorders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entry held in the room transcript.
///
/// Chat messages carry a server-assigned `id`, unique for the room's
/// lifetime, which doubles as the dedup key. Presence events have no
/// natural identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A chat message.
    Message {
        id: String,
        username: String,
        contents: String,
        timestamp: DateTime<Utc>,
    },
    /// A participant joined the room.
    UserJoined {
        username: String,
        timestamp: DateTime<Utc>,
    },
    /// A participant left the room.
    UserLeft {
        username: String,
        timestamp: DateTime<Utc>,
    },
}

impl RoomEvent {
    /// Get the username from any variant.
    pub fn username(&self) -> &str {
        match self {
            RoomEvent::Message { username, .. } => username,
            RoomEvent::UserJoined { username, .. } => username,
            RoomEvent::UserLeft { username, .. } => username,
        }
    }

    /// Get the server-assigned timestamp from any variant.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RoomEvent::Message { timestamp, .. } => *timestamp,
            RoomEvent::UserJoined { timestamp, .. } => *timestamp,
            RoomEvent::UserLeft { timestamp, .. } => *timestamp,
        }
    }

    /// Dedup key — present only for chat messages.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            RoomEvent::Message { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Whether this is a join/leave notification rather than chat content.
    pub fn is_presence(&self) -> bool {
        matches!(self, RoomEvent::UserJoined { .. } | RoomEvent::UserLeft { .. })
    }
}

/// Inbound envelope, one per frame on the connection.
///
/// `MessageHistory` is the per-epoch snapshot: it carries the identity
/// assigned to this client and the room's recent history, and is
/// delivered once immediately after each successful connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Snapshot: assigned identity + replayed history.
    MessageHistory {
        username: String,
        #[serde(default)]
        messages: Vec<RoomEvent>,
    },
    /// A live chat message.
    Message {
        id: String,
        username: String,
        contents: String,
        timestamp: DateTime<Utc>,
    },
    /// A participant joined.
    UserJoined {
        username: String,
        timestamp: DateTime<Utc>,
    },
    /// A participant left.
    UserLeft {
        username: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerEvent {
    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// The only outbound payload. The server assigns `id`, `username` and
/// `timestamp` before fanning the message back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    pub contents: String,
}

impl Outbound {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    Encode(String),
    Decode(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_decode_message() {
        let raw = r#"{"type":"message","id":"msg_4f2a","username":"BraveFox","contents":"hi","timestamp":"2026-08-07T12:00:00Z"}"#;
        let event = ServerEvent::decode(raw).unwrap();
        match event {
            ServerEvent::Message {
                id,
                username,
                contents,
                ..
            } => {
                assert_eq!(id, "msg_4f2a");
                assert_eq!(username, "BraveFox");
                assert_eq!(contents, "hi");
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_history_with_nested_events() {
        let raw = r#"{
            "type": "message_history",
            "username": "QuietOwl",
            "messages": [
                {"type":"message","id":"m1","username":"BraveFox","contents":"hello","timestamp":"2026-08-07T12:00:00Z"},
                {"type":"user_joined","username":"QuietOwl","timestamp":"2026-08-07T12:00:01Z"}
            ]
        }"#;
        let event = ServerEvent::decode(raw).unwrap();
        match event {
            ServerEvent::MessageHistory { username, messages } => {
                assert_eq!(username, "QuietOwl");
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].message_id(), Some("m1"));
                assert!(messages[1].is_presence());
            }
            other => panic!("expected MessageHistory, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_history_without_messages_field() {
        let raw = r#"{"type":"message_history","username":"QuietOwl"}"#;
        let event = ServerEvent::decode(raw).unwrap();
        match event {
            ServerEvent::MessageHistory { messages, .. } => assert!(messages.is_empty()),
            other => panic!("expected MessageHistory, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_presence() {
        let joined =
            ServerEvent::decode(r#"{"type":"user_joined","username":"BraveFox","timestamp":"2026-08-07T12:00:00Z"}"#)
                .unwrap();
        let left =
            ServerEvent::decode(r#"{"type":"user_left","username":"BraveFox","timestamp":"2026-08-07T12:00:05Z"}"#)
                .unwrap();
        assert!(matches!(joined, ServerEvent::UserJoined { .. }));
        assert!(matches!(left, ServerEvent::UserLeft { .. }));
    }

    #[test]
    fn test_unknown_kind_is_a_decode_error() {
        let raw = r#"{"type":"room_nuked","username":"BraveFox","timestamp":"2026-08-07T12:00:00Z"}"#;
        assert!(ServerEvent::decode(raw).is_err());
    }

    #[test]
    fn test_malformed_frame_is_a_decode_error() {
        assert!(ServerEvent::decode("not json").is_err());
        assert!(ServerEvent::decode(r#"{"type":"message"}"#).is_err());
        assert!(
            ServerEvent::decode(r#"{"type":"message","id":"m1","username":"x","contents":"y","timestamp":"yesterday"}"#)
                .is_err()
        );
    }

    #[test]
    fn test_roundtrip() {
        let event = ServerEvent::Message {
            id: "m7".to_string(),
            username: "SwiftBear".to_string(),
            contents: "round we go".to_string(),
            timestamp: ts(1_700_000_000),
        };
        let encoded = event.encode().unwrap();
        let decoded = ServerEvent::decode(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_outbound_shape() {
        let encoded = Outbound::new("hello room").encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, serde_json::json!({"contents": "hello room"}));
    }

    #[test]
    fn test_event_accessors() {
        let msg = RoomEvent::Message {
            id: "m1".to_string(),
            username: "BraveFox".to_string(),
            contents: "hi".to_string(),
            timestamp: ts(100),
        };
        let joined = RoomEvent::UserJoined {
            username: "QuietOwl".to_string(),
            timestamp: ts(101),
        };

        assert_eq!(msg.username(), "BraveFox");
        assert_eq!(msg.timestamp(), ts(100));
        assert_eq!(msg.message_id(), Some("m1"));
        assert!(!msg.is_presence());

        assert_eq!(joined.username(), "QuietOwl");
        assert_eq!(joined.message_id(), None);
        assert!(joined.is_presence());
    }
}
