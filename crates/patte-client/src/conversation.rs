//! Per-room message store.
//!
//! Holds the messages of one open room: a history snapshot from REST plus
//! live frames appended after it. The broker echoes our own sends back on
//! the room topic and reconnects can replay recent frames, so appends are
//! deduplicated by server-assigned message id.

use std::collections::HashSet;

use patte_shared::types::{Message, RoomId, UserId};

/// Messages of one open room, in arrival order.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    room_id: RoomId,
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl ConversationStore {
    /// Create an empty store for a room.
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            messages: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// The room this store belongs to.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Replace the whole content with a freshly fetched history snapshot.
    pub fn replace_history(&mut self, messages: Vec<Message>) {
        self.ids = messages.iter().map(|m| m.id.clone()).collect();
        self.messages = messages;
    }

    /// Append a live message.
    ///
    /// Returns false when a message with the same id is already present;
    /// the first write wins and the duplicate is dropped.
    pub fn append_live(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Flip every unread message sent by `current_user` to read.
    ///
    /// Returns how many messages changed. The flag is monotonic: a read
    /// message never becomes unread again.
    pub fn mark_sent_as_read(&mut self, current_user: &UserId) -> usize {
        let mut flipped = 0;
        for message in &mut self.messages {
            if message.sender_id == *current_user && !message.is_read {
                message.is_read = true;
                flipped += 1;
            }
        }
        flipped
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages held.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
