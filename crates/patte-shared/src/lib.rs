// Types shared across the messaging crates: ids, wire frames, constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{
    encode_body, ChatMessagePayload, ClientFrame, OutgoingChatMessage, ReadEvent, ServerFrame,
};
pub use types::{
    ConnectionState, Identity, Message, Notification, RoomId, RoomSummary, TopicKind, UserId,
};
