//! Error types for `Rollcall` core library.

use thiserror::Error;

/// Result type alias using `Rollcall` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `Rollcall` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame did not parse into any known protocol message
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame exceeded the configured line limit
    #[error("Frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error only affects the current frame, leaving the stream usable.
    pub const fn is_frame_local(&self) -> bool {
        matches!(self, Self::MalformedFrame(_) | Self::FrameTooLarge { .. })
    }
}
