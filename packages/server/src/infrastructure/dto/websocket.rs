//! WebSocket event envelopes and codec.
//!
//! Every frame is a JSON object `{"type": <tag>, "payload": <object>}`.
//! Inbound frames are decoded once, at the boundary, into [`ClientEvent`];
//! an unrecognised tag becomes [`ClientEvent::Unknown`] instead of a decode
//! failure so the dispatcher can answer it with an `error` event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is not a JSON object with a string `type`
    #[error("malformed event envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// The tag is known but its payload does not match
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}

// ========================================
// Inbound (client → server)
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomPayload {
    pub room_id: i64,
}

/// Decoded inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    SendMessage(SendMessagePayload),
    JoinRoom(JoinRoomPayload),
    Typing,
    /// Envelope was well formed but the tag is not one we handle
    Unknown(String),
}

impl ClientEvent {
    pub const SEND_MESSAGE: &'static str = "send_message";
    pub const JOIN_ROOM: &'static str = "join_room";
    pub const TYPING: &'static str = "typing";

    /// Wire tag of this event
    pub fn kind(&self) -> &str {
        match self {
            ClientEvent::SendMessage(_) => Self::SEND_MESSAGE,
            ClientEvent::JoinRoom(_) => Self::JOIN_ROOM,
            ClientEvent::Typing => Self::TYPING,
            ClientEvent::Unknown(tag) => tag,
        }
    }

    /// Decode one text frame
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let envelope: RawEnvelope =
            serde_json::from_str(text).map_err(CodecError::MalformedEnvelope)?;

        let tag = envelope.r#type;
        match tag.as_str() {
            Self::SEND_MESSAGE => serde_json::from_value(envelope.payload)
                .map(ClientEvent::SendMessage)
                .map_err(|source| CodecError::InvalidPayload {
                    kind: Self::SEND_MESSAGE,
                    source,
                }),
            Self::JOIN_ROOM => serde_json::from_value(envelope.payload)
                .map(ClientEvent::JoinRoom)
                .map_err(|source| CodecError::InvalidPayload {
                    kind: Self::JOIN_ROOM,
                    source,
                }),
            // typing carries no data; whatever payload was sent is ignored
            Self::TYPING => Ok(ClientEvent::Typing),
            _ => Ok(ClientEvent::Unknown(tag.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    r#type: String,
    #[serde(default)]
    payload: serde_json::Value,
}

// ========================================
// Outbound (server → client)
// ========================================

/// A persisted message as sent to clients (`new_message` and `history`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPayload {
    pub messages: Vec<MessagePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Outbound event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(MessagePayload),
    History(HistoryPayload),
    Typing(TypingPayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text).map_err(CodecError::MalformedEnvelope)
    }
}
