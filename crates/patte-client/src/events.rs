use tokio::sync::broadcast;

use patte_shared::types::{ConnectionState, Message, Notification, RoomId, RoomSummary};

/// Aggregate unread badge counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnreadCounts {
    /// Sum of per-room unread counters.
    pub rooms: u32,
    /// Unread notifications.
    pub notifications: u32,
}

/// Events pushed to the presentation layer.
///
/// Every open view observes the same broadcast stream and filters by room
/// id, so two views of one room each get every event.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A live chat message was appended to an open room.
    MessageReceived { room_id: RoomId, message: Message },
    /// The room directory changed; rooms are sorted by last activity,
    /// newest first.
    RoomListUpdated { rooms: Vec<RoomSummary> },
    /// The peer read the room; own messages there flipped to read.
    MessagesRead { room_id: RoomId },
    /// A notification arrived for the first time. Toast it exactly once.
    NotificationArrived { notification: Notification },
    /// Unread badge counters changed.
    UnreadChanged { counts: UnreadCounts },
    /// Broker connection state edge. `Error` doubles as the reconnecting
    /// indicator.
    ConnectionChanged { state: ConnectionState },
}

/// Broadcast an event to every subscribed view.
///
/// A send error only means nobody is listening yet, which is normal
/// before the first view mounts.
pub fn emit_event(tx: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    if let Err(e) = tx.send(event) {
        tracing::debug!(error = %e, "No event subscribers, dropping event");
    }
}
