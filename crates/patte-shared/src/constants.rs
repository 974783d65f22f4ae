/// Application name
pub const APP_NAME: &str = "Patte";

/// Topic prefix for per-room chat message streams (`chat/{roomId}`)
pub const CHAT_TOPIC_PREFIX: &str = "chat/";

/// Topic suffix for per-room read-receipt streams (`chat/{roomId}/read`)
pub const READ_TOPIC_SUFFIX: &str = "/read";

/// Topic prefix for per-user notification streams (`notifications/{userId}`)
pub const NOTIFICATION_TOPIC_PREFIX: &str = "notifications/";

/// Publish destination for outgoing chat messages
pub const CHAT_MESSAGE_DESTINATION: &str = "chat-message";

/// Publish destination prefix for read events (`chat-read/{roomId}`)
pub const CHAT_READ_DESTINATION_PREFIX: &str = "chat-read/";

/// Capacity of the session command channel
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the session event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the client event broadcast channel
pub const CLIENT_EVENT_CAPACITY: usize = 256;

/// Default REST API base URL
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

/// Default broker WebSocket URL
pub const DEFAULT_BROKER_URL: &str = "ws://127.0.0.1:8080/ws";

/// Default keepalive ping interval in seconds (0 disables keepalive)
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;

/// Default pong wait after a keepalive ping, in seconds
pub const DEFAULT_PONG_TIMEOUT_SECS: u64 = 10;

/// Default broker handshake timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Initial reconnect backoff delay in milliseconds
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 500;

/// Reconnect backoff ceiling in milliseconds
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
