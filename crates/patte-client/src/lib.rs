// Messaging client core: the ChatService facade and its stores.

pub mod config;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod events;
pub mod notifications;
pub mod receipts;
pub mod service;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use conversation::ConversationStore;
pub use directory::{DirectoryOutcome, RoomDirectory};
pub use error::{ClientError, Result};
pub use events::{ClientEvent, UnreadCounts};
pub use notifications::NotificationFeed;
pub use service::ChatService;

/// Install the tracing subscriber. Call once at startup, before
/// [`ChatService::start`]. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("patte_client=debug,patte_net=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
