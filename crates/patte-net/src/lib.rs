// Broker transport and REST plumbing for the messaging client.

pub mod error;
pub mod rest;
pub mod session;
pub mod subscriptions;

pub use error::{ApiError, SessionError};
pub use rest::{parse_room_listing, ApiClient};
pub use session::{spawn_session, SessionConfig, SessionEvent, SessionHandle};
pub use subscriptions::{Multiplexer, TopicRegistry};
