//! REST client for the chat and notification endpoints.

use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use patte_shared::types::{Message, Notification, RoomId, RoomSummary};

use crate::error::ApiError;

/// Bearer-authenticated client for the platform backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /chat/rooms`.
    ///
    /// The listing arrives in several envelope shapes depending on backend
    /// version; anything unrecognized normalizes to an empty list instead
    /// of an error.
    pub async fn chat_rooms(&self) -> Result<Vec<RoomSummary>, ApiError> {
        let response = self
            .http
            .get(self.url("/chat/rooms"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Room listing was not JSON, treating as empty");
                return Ok(Vec::new());
            }
        };
        Ok(parse_room_listing(body))
    }

    /// `GET /chat/room/{roomId}/messages`.
    ///
    /// A 403 means the current user may not view the room and must not
    /// retry; it maps to [`ApiError::Forbidden`].
    pub async fn room_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, ApiError> {
        let response = self
            .http
            .get(self.url(&format!("/chat/room/{room_id}/messages")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(ApiError::Forbidden);
        }
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        let text = response.text().await?;
        let messages: Vec<Message> = serde_json::from_str(&text)?;
        Ok(messages)
    }

    /// `GET /notifications/unread`.
    pub async fn unread_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        let response = self
            .http
            .get(self.url("/notifications/unread"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        let text = response.text().await?;
        let notifications: Vec<Notification> = serde_json::from_str(&text)?;
        Ok(notifications)
    }

    /// `PATCH /notifications/{notyId}/read`.
    pub async fn mark_notification_read(&self, noty_id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .patch(self.url(&format!("/notifications/{noty_id}/read")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// `PATCH /notifications/read-all`.
    pub async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        let response = self
            .http
            .patch(self.url("/notifications/read-all"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Normalize the room-listing envelope.
///
/// Accepted shapes: a bare array, `{"data": [...]}` and `{"content": [...]}`.
/// Anything else yields an empty list, and entries that fail to decode are
/// skipped, so a surprise payload can never take the room list down.
pub fn parse_room_listing(body: Value) -> Vec<RoomSummary> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("content")) {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("Unrecognized room listing envelope, treating as empty");
                return Vec::new();
            }
        },
        _ => {
            warn!("Unrecognized room listing envelope, treating as empty");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RoomSummary>(item) {
            Ok(room) => Some(room),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable room entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bare_array() {
        let body = json!([{"roomId": "1"}, {"roomId": "2"}]);
        let rooms = parse_room_listing(body);
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].room_id, RoomId::new("1"));
    }

    #[test]
    fn test_parse_data_envelope() {
        let body = json!({"data": [{"roomId": "1"}]});
        assert_eq!(parse_room_listing(body).len(), 1);
    }

    #[test]
    fn test_parse_content_envelope() {
        let body = json!({
            "content": [
                {"roomId": "1", "opponentNickname": "Ana", "unreadCount": 3},
                {"roomId": "2"}
            ]
        });
        let rooms = parse_room_listing(body);
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].unread_count, 3);
    }

    #[test]
    fn test_parse_unknown_envelope_is_empty() {
        assert!(parse_room_listing(json!({})).is_empty());
        assert!(parse_room_listing(json!({"rooms": [{"roomId": "1"}]})).is_empty());
        assert!(parse_room_listing(json!("nope")).is_empty());
        assert!(parse_room_listing(json!(null)).is_empty());
    }

    #[test]
    fn test_parse_skips_undecodable_entries() {
        let body = json!([{"roomId": "1"}, 42, {"unreadCount": "not-a-number"}]);
        let rooms = parse_room_listing(body);
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room_id, RoomId::new("1"));
    }
}
