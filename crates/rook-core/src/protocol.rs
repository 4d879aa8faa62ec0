//! Browser ↔ server wire protocol.
//!
//! Inbound frames use lowercase keys (`type`, `origin`, `destination`,
//! `message`, `id`); outbound frames use capitalized keys (`Type`, `Position`,
//! `Message`, `Error`). Fields irrelevant to a variant are empty strings.

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Wire tag for move frames.
pub const KIND_MOVE: &str = "move";
/// Wire tag for chat frames.
pub const KIND_CHAT: &str = "message";
/// Wire tag for connection announcements.
pub const KIND_CONNECT: &str = "connection";

/// Raw inbound frame as sent by the browser.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub id: String,
}

/// Frame could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("malformed frame: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Decoded inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundMessage {
    /// Move a piece. `session_id` may be empty if the browser omitted it.
    Move {
        origin: String,
        destination: String,
        session_id: SessionId,
    },
    /// Free-form chat text.
    Chat { text: String },
    /// Connection announcement text.
    Connect { text: String },
    /// A well-formed frame with a tag this server does not handle.
    Unknown { kind: String },
}

impl InboundMessage {
    /// Decode a raw payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let frame: InboundFrame = serde_json::from_slice(payload)?;
        Ok(Self::from(frame))
    }
}

impl From<InboundFrame> for InboundMessage {
    fn from(frame: InboundFrame) -> Self {
        match frame.kind.as_str() {
            KIND_MOVE => Self::Move {
                origin: frame.origin,
                destination: frame.destination,
                session_id: SessionId::from_raw(frame.id),
            },
            KIND_CHAT => Self::Chat {
                text: frame.message,
            },
            KIND_CONNECT => Self::Connect {
                text: frame.message,
            },
            _ => Self::Unknown { kind: frame.kind },
        }
    }
}

/// Raw outbound frame as read by the browser.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundFrame {
    #[serde(rename = "Type")]
    pub kind: String,
    pub position: String,
    pub message: String,
    pub error: String,
}

/// Message produced for one participant's socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Board after a move attempt. `notice` carries a rejection reason or a
    /// check/checkmate announcement; empty otherwise.
    Move { position: String, notice: String },
    /// Chat text passed through.
    Chat { text: String },
    /// Connection acknowledgement.
    Connect { text: String },
    /// The connection could not be attached to its session.
    Refused { error: String },
}

impl OutboundMessage {
    /// Build the wire frame.
    pub fn to_frame(&self) -> OutboundFrame {
        match self {
            Self::Move { position, notice } => OutboundFrame {
                kind: KIND_MOVE.into(),
                position: position.clone(),
                error: notice.clone(),
                ..OutboundFrame::default()
            },
            Self::Chat { text } => OutboundFrame {
                kind: KIND_CHAT.into(),
                message: text.clone(),
                ..OutboundFrame::default()
            },
            Self::Connect { text } => OutboundFrame {
                kind: KIND_CONNECT.into(),
                message: text.clone(),
                ..OutboundFrame::default()
            },
            Self::Refused { error } => OutboundFrame {
                kind: KIND_CONNECT.into(),
                error: error.clone(),
                ..OutboundFrame::default()
            },
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_move() {
        let raw = br#"{"type":"move","origin":"e2","destination":"e4","message":"","id":"A1"}"#;
        let msg = InboundMessage::decode(raw).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Move {
                origin: "e2".into(),
                destination: "e4".into(),
                session_id: SessionId::from_raw("A1"),
            }
        );
    }

    #[test]
    fn decode_chat_with_missing_fields() {
        let msg = InboundMessage::decode(br#"{"type":"message","message":"hi"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Chat { text: "hi".into() });
    }

    #[test]
    fn decode_connect() {
        let msg = InboundMessage::decode(br#"{"type":"connection","message":"white joined"}"#)
            .unwrap();
        assert_eq!(
            msg,
            InboundMessage::Connect {
                text: "white joined".into()
            }
        );
    }

    #[test]
    fn decode_unknown_kind() {
        let msg = InboundMessage::decode(br#"{"type":"resign"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Unknown {
                kind: "resign".into()
            }
        );
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(InboundMessage::decode(b"not json").is_err());
        assert!(InboundMessage::decode(b"[1,2]").is_err());
        assert!(InboundMessage::decode(b"").is_err());
    }

    #[test]
    fn move_frame_uses_capitalized_keys() {
        let out = OutboundMessage::Move {
            position: "fen".into(),
            notice: "Check!".into(),
        };
        let json: serde_json::Value = serde_json::from_str(&out.encode().unwrap()).unwrap();
        assert_eq!(json["Type"], "move");
        assert_eq!(json["Position"], "fen");
        assert_eq!(json["Message"], "");
        assert_eq!(json["Error"], "Check!");
    }

    #[test]
    fn chat_frame_carries_text_in_message() {
        let frame = OutboundMessage::Chat { text: "gg".into() }.to_frame();
        assert_eq!(frame.kind, "message");
        assert_eq!(frame.message, "gg");
        assert!(frame.position.is_empty());
        assert!(frame.error.is_empty());
    }

    #[test]
    fn refused_frame_is_a_connection_error() {
        let frame = OutboundMessage::Refused {
            error: "session not found".into(),
        }
        .to_frame();
        assert_eq!(frame.kind, "connection");
        assert_eq!(frame.error, "session not found");
    }
}
