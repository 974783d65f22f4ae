use thiserror::Error;

/// Errors produced while encoding or decoding broker traffic.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A frame or payload failed to serialize.
    #[error("Frame encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// A frame or payload failed to deserialize.
    #[error("Frame decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;
