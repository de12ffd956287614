//! Messaging error types.

use thiserror::Error;

/// Errors that can occur on the bus or in its consumers.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The bus has been shut down.
    #[error("Message bus is closed")]
    BusClosed,

    /// Failed to serialize or deserialize an event payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The dead-letter sink rejected a letter.
    #[error("Dead letter sink error: {0}")]
    DeadLetter(String),
}

/// Failure reported by an [`EventHandler`](crate::EventHandler).
///
/// Handlers are retried on any error; the message ends up in the dead
/// letter if retries run out.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<MessagingError> for HandlerError {
    fn from(err: MessagingError) -> Self {
        Self(err.to_string())
    }
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
