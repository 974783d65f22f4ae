use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::types::{Message, RoomId, UserId};

/// Frames the client sends to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving frames published on `topic`
    Subscribe { topic: String },

    /// Stop receiving frames published on `topic`
    Unsubscribe { topic: String },

    /// Publish `body` to a destination (fire-and-forget)
    Send { destination: String, body: Value },
}

/// Frames the broker sends to the client.
///
/// Frames on one topic arrive in broker order; no ordering is promised
/// across topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Message { topic: String, body: Value },
}

impl ClientFrame {
    /// Serialize to a JSON text frame
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

impl ServerFrame {
    /// Deserialize from a JSON text frame
    pub fn from_text(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

/// Encode a payload as the `body` of a `ClientFrame::Send`.
pub fn encode_body<T: Serialize>(payload: &T) -> Result<Value> {
    serde_json::to_value(payload).map_err(ProtocolError::Encode)
}

/// Body of a live chat message delivered on `chat/{roomId}`.
///
/// The broker echoes accepted messages back on the room topic with the
/// server-assigned id and timestamp, so senders and peers receive the
/// same payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub room_id: RoomId,
    pub id: String,
    pub content: String,
    pub sender_id: UserId,
    pub sender_name: String,
    /// One backend serializer misspells this field; accept both spellings.
    #[serde(alias = "createdAt", alias = "craetedAt")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessagePayload {
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            content: self.content,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            timestamp: self.timestamp,
            is_read: false,
        }
    }
}

/// Body published to `chat-message`. The server assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingChatMessage {
    pub room_id: RoomId,
    pub content: String,
    pub sender_id: UserId,
    pub sender_name: String,
}

/// Body of a read event, published to `chat-read/{roomId}` and delivered
/// on `chat/{roomId}/read`. `user_id` is the reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadEvent {
    pub room_id: RoomId,
    pub user_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_tagging() {
        let frame = ClientFrame::Subscribe {
            topic: "chat/42".to_string(),
        };
        let text = frame.to_text().unwrap();
        assert_eq!(text, r#"{"type":"subscribe","topic":"chat/42"}"#);
    }

    #[test]
    fn test_server_frame_decodes_message() {
        let text = r#"{"type":"message","topic":"chat/42","body":{"roomId":"42"}}"#;
        let ServerFrame::Message { topic, body } = ServerFrame::from_text(text).unwrap();
        assert_eq!(topic, "chat/42");
        assert_eq!(body["roomId"], "42");
    }

    #[test]
    fn test_server_frame_rejects_unknown_type() {
        assert!(ServerFrame::from_text(r#"{"type":"receipt","topic":"t"}"#).is_err());
        assert!(ServerFrame::from_text("not json").is_err());
    }

    #[test]
    fn test_chat_payload_into_message() {
        let json = r#"{
            "roomId": "7",
            "id": "10",
            "content": "des nouvelles de Plume ?",
            "senderId": "u-2",
            "senderName": "Bo",
            "timestamp": "2026-03-01T10:00:00Z"
        }"#;
        let payload: ChatMessagePayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.room_id, RoomId::new("7"));

        let msg = payload.into_message();
        assert_eq!(msg.id, "10");
        assert!(!msg.is_read);
    }
}
