use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CHAT_READ_DESTINATION_PREFIX, CHAT_TOPIC_PREFIX, NOTIFICATION_TOPIC_PREFIX, READ_TOPIC_SUFFIX,
};

// User identity = opaque id assigned by the platform backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn notification_topic(&self) -> String {
        format!("{NOTIFICATION_TOPIC_PREFIX}{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Room identity = opaque id; rooms are created server-side only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn message_topic(&self) -> String {
        format!("{CHAT_TOPIC_PREFIX}{}", self.0)
    }

    pub fn read_topic(&self) -> String {
        format!("{CHAT_TOPIC_PREFIX}{}{READ_TOPIC_SUFFIX}", self.0)
    }

    pub fn read_destination(&self) -> String {
        format!("{CHAT_READ_DESTINATION_PREFIX}{}", self.0)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing classification of an inbound broker topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind {
    RoomMessages(RoomId),
    RoomRead(RoomId),
    Notifications(UserId),
}

impl TopicKind {
    /// Classify a topic string. Returns `None` for anything that is not one
    /// of the three streams this client subscribes to.
    pub fn parse(topic: &str) -> Option<Self> {
        if let Some(rest) = topic.strip_prefix(CHAT_TOPIC_PREFIX) {
            if let Some(room) = rest.strip_suffix(READ_TOPIC_SUFFIX) {
                if room.is_empty() || room.contains('/') {
                    return None;
                }
                return Some(Self::RoomRead(RoomId::new(room)));
            }
            if rest.is_empty() || rest.contains('/') {
                return None;
            }
            return Some(Self::RoomMessages(RoomId::new(rest)));
        }
        if let Some(user) = topic.strip_prefix(NOTIFICATION_TOPIC_PREFIX) {
            if user.is_empty() {
                return None;
            }
            return Some(Self::Notifications(UserId::new(user)));
        }
        None
    }
}

/// Who the client is acting as, supplied by the auth collaborator.
/// Immutable for the lifetime of the authenticated session.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: UserId,
    pub nickname: String,
    /// Bearer credential, used on REST calls and as the connection-time
    /// identity claim on the broker handshake.
    pub token: String,
}

/// State of the shared broker connection, observable by every consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Transport failure; the session retries on its own while it stays active.
    Error,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One chat message as held in a conversation store.
///
/// `is_read` is only meaningful on messages the current user sent: it flips
/// to true when the peer's read receipt arrives, and never flips back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender_id: UserId,
    pub sender_name: String,
    /// One backend serializer misspells this field; accept both spellings.
    #[serde(alias = "createdAt", alias = "craetedAt")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

/// One row of the room directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    #[serde(default)]
    pub opponent_nickname: String,
    #[serde(default)]
    pub last_message_content: Option<String>,
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

/// A system notification (comments, likes, adoption updates, ...).
/// Field names follow the platform's REST contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub noty_id: String,
    #[serde(default)]
    pub noty_content: String,
    #[serde(default)]
    pub noty_link: String,
    #[serde(default)]
    pub noty_type: String,
    pub noty_created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_builders_round_trip() {
        let room = RoomId::new("42");
        let user = UserId::new("u-7");

        assert_eq!(
            TopicKind::parse(&room.message_topic()),
            Some(TopicKind::RoomMessages(room.clone()))
        );
        assert_eq!(
            TopicKind::parse(&room.read_topic()),
            Some(TopicKind::RoomRead(room.clone()))
        );
        assert_eq!(
            TopicKind::parse(&user.notification_topic()),
            Some(TopicKind::Notifications(user))
        );
    }

    #[test]
    fn test_topic_parse_rejects_unknown() {
        assert_eq!(TopicKind::parse("chat/"), None);
        assert_eq!(TopicKind::parse("chat//read"), None);
        assert_eq!(TopicKind::parse("chat/a/b/read"), None);
        assert_eq!(TopicKind::parse("notifications/"), None);
        assert_eq!(TopicKind::parse("boards/1"), None);
        assert_eq!(TopicKind::parse(""), None);
    }

    #[test]
    fn test_read_destination_is_not_a_topic() {
        let room = RoomId::new("9");
        assert_eq!(room.read_destination(), "chat-read/9");
        assert_eq!(TopicKind::parse(&room.read_destination()), None);
    }

    #[test]
    fn test_message_accepts_misspelled_timestamp() {
        let json = r#"{
            "id": "5",
            "content": "bonjour",
            "senderId": "u-1",
            "senderName": "Ana",
            "craetedAt": "2026-03-01T10:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "5");
        assert_eq!(msg.timestamp.to_rfc3339(), "2026-03-01T10:00:00+00:00");
        assert!(!msg.is_read);
    }

    #[test]
    fn test_room_summary_tolerates_missing_fields() {
        let json = r#"{"roomId": "3"}"#;
        let room: RoomSummary = serde_json::from_str(json).unwrap();
        assert_eq!(room.room_id, RoomId::new("3"));
        assert_eq!(room.last_message_content, None);
        assert_eq!(room.unread_count, 0);
    }
}
