use thiserror::Error;

/// Errors talking to the background session task.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session task has stopped and its command channel is gone.
    #[error("Session task is not running")]
    ChannelClosed,
}

/// Errors from the chat and notification REST endpoints.
#[derive(Error, Debug)]
pub enum ApiError {
    /// 403: the current user may not view this resource. Not retryable.
    #[error("Access forbidden")]
    Forbidden,

    /// Any other non-success HTTP status.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not decode as the expected shape.
    #[error("Response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
