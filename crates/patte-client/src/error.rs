use thiserror::Error;

use patte_net::{ApiError, SessionError};
use patte_shared::error::ProtocolError;
use patte_shared::types::RoomId;

/// Errors surfaced by the client facade.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The current user may not view this room. The caller should leave
    /// the room view; retrying will not help.
    #[error("Not authorized to view room {room_id}")]
    RoomForbidden { room_id: RoomId },

    /// REST call failure.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The session task is gone.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// A payload failed to encode or decode.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Another task panicked while holding the state lock.
    #[error("State lock poisoned")]
    StatePoisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
