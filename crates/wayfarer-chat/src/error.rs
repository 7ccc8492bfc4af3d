//! Error types for the chat engine.

use wayfarer_core::error::WayfarerError;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("network is offline")]
    Offline,
    #[error("a request is already in flight")]
    Busy,
    #[error("request failed: {0}")]
    Request(String),
    #[error("authentication with the generative service failed")]
    Authentication,
    #[error("rate limited by the generative service")]
    RateLimited,
    #[error("service error: {0}")]
    Service(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("voice error: {0}")]
    Voice(String),
}

impl From<WayfarerError> for ChatError {
    fn from(err: WayfarerError) -> Self {
        match err {
            WayfarerError::Voice(msg) => ChatError::Voice(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Storage(format!("serialization failed: {}", err))
    }
}
