//! Room directory: the room list with previews and unread counters.
//!
//! The list is replaced wholesale by REST refreshes and bumped in place by
//! live messages. It stays sorted by last activity, newest first, so views
//! can render it directly.

use patte_shared::types::{Message, RoomId, RoomSummary, UserId};

/// What a live message did to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryOutcome {
    /// The room was listed; its preview, timestamp and unread counter were
    /// updated and the list re-sorted.
    Bumped,
    /// The room is not listed. The caller should refresh the directory
    /// from REST; rooms are never invented locally.
    UnknownRoom,
}

/// All rooms the current user participates in.
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    rooms: Vec<RoomSummary>,
}

impl RoomDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self { rooms: Vec::new() }
    }

    /// Replace the whole list with a freshly fetched one.
    pub fn replace(&mut self, rooms: Vec<RoomSummary>) {
        self.rooms = rooms;
        self.sort();
    }

    /// Apply a live message to the listing.
    ///
    /// Bumps the room's preview and timestamp and increments its unread
    /// counter unless the message is the current user's own.
    pub fn on_incoming_message(
        &mut self,
        current_user: &UserId,
        room_id: &RoomId,
        message: &Message,
    ) -> DirectoryOutcome {
        let Some(room) = self.rooms.iter_mut().find(|r| r.room_id == *room_id) else {
            return DirectoryOutcome::UnknownRoom;
        };

        room.last_message_content = Some(message.content.clone());
        room.last_message_time = Some(message.timestamp);
        if message.sender_id != *current_user {
            room.unread_count += 1;
        }
        self.sort();
        DirectoryOutcome::Bumped
    }

    /// Zero a room's unread counter. Returns true when it was non-zero.
    pub fn clear_unread(&mut self, room_id: &RoomId) -> bool {
        match self.rooms.iter_mut().find(|r| r.room_id == *room_id) {
            Some(room) if room.unread_count > 0 => {
                room.unread_count = 0;
                true
            }
            _ => false,
        }
    }

    /// All rooms, most recently active first.
    pub fn rooms(&self) -> &[RoomSummary] {
        &self.rooms
    }

    /// Look up one room.
    pub fn get(&self, room_id: &RoomId) -> Option<&RoomSummary> {
        self.rooms.iter().find(|r| r.room_id == *room_id)
    }

    /// Sum of unread counters across all rooms.
    pub fn total_unread(&self) -> u32 {
        self.rooms.iter().map(|r| r.unread_count).sum()
    }

    /// Number of listed rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms are listed.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn sort(&mut self) {
        // None (never messaged) sorts after every real timestamp.
        self.rooms
            .sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, 0).unwrap()
    }

    fn summary(room_id: &str, minute: Option<u32>) -> RoomSummary {
        RoomSummary {
            room_id: RoomId::new(room_id),
            opponent_nickname: format!("peer-{room_id}"),
            last_message_content: minute.map(|m| format!("last at {m}")),
            last_message_time: minute.map(at),
            unread_count: 0,
        }
    }

    fn live_message(sender: &str, minute: u32) -> Message {
        Message {
            id: format!("m-{minute}"),
            content: "une photo de Caramel".to_string(),
            sender_id: UserId::new(sender),
            sender_name: sender.to_string(),
            timestamp: at(minute),
            is_read: false,
        }
    }

    #[test]
    fn test_replace_sorts_newest_first() {
        let mut directory = RoomDirectory::new();
        directory.replace(vec![
            summary("1", Some(5)),
            summary("2", None),
            summary("3", Some(20)),
        ]);

        let order: Vec<&str> = directory.rooms().iter().map(|r| r.room_id.0.as_str()).collect();
        assert_eq!(order, ["3", "1", "2"]);
    }

    #[test]
    fn test_incoming_message_bumps_room_to_front() {
        let me = UserId::new("me");
        let mut directory = RoomDirectory::new();
        directory.replace(vec![
            summary("1", Some(30)),
            summary("2", Some(20)),
            summary("42", Some(10)),
        ]);

        let outcome =
            directory.on_incoming_message(&me, &RoomId::new("42"), &live_message("peer", 45));
        assert_eq!(outcome, DirectoryOutcome::Bumped);

        let front = &directory.rooms()[0];
        assert_eq!(front.room_id, RoomId::new("42"));
        assert_eq!(front.unread_count, 1);
        assert_eq!(front.last_message_content.as_deref(), Some("une photo de Caramel"));
        assert_eq!(front.last_message_time, Some(at(45)));
    }

    #[test]
    fn test_own_message_bumps_without_unread() {
        let me = UserId::new("me");
        let mut directory = RoomDirectory::new();
        directory.replace(vec![summary("1", Some(30)), summary("42", Some(10))]);

        let outcome =
            directory.on_incoming_message(&me, &RoomId::new("42"), &live_message("me", 45));
        assert_eq!(outcome, DirectoryOutcome::Bumped);
        assert_eq!(directory.rooms()[0].room_id, RoomId::new("42"));
        assert_eq!(directory.rooms()[0].unread_count, 0);
        assert_eq!(directory.total_unread(), 0);
    }

    #[test]
    fn test_unlisted_room_reports_unknown() {
        let me = UserId::new("me");
        let mut directory = RoomDirectory::new();
        directory.replace(vec![summary("1", Some(30))]);

        let outcome =
            directory.on_incoming_message(&me, &RoomId::new("99"), &live_message("peer", 45));
        assert_eq!(outcome, DirectoryOutcome::UnknownRoom);
        // Nothing was invented locally.
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_clear_unread() {
        let me = UserId::new("me");
        let mut directory = RoomDirectory::new();
        directory.replace(vec![summary("42", Some(10))]);
        directory.on_incoming_message(&me, &RoomId::new("42"), &live_message("peer", 45));
        assert_eq!(directory.total_unread(), 1);

        assert!(directory.clear_unread(&RoomId::new("42")));
        assert!(!directory.clear_unread(&RoomId::new("42")));
        assert_eq!(directory.total_unread(), 0);
    }
}
