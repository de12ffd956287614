//! Application error types.

use billing::BillingError;
use messaging::MessagingError;
use thiserror::Error;

/// Errors raised while starting, running or stopping the service.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// A listener task panicked or was cancelled.
    #[error("Listener task failed: {0}")]
    Listener(#[from] tokio::task::JoinError),
}

/// Convenience type alias for application results.
pub type Result<T> = std::result::Result<T, AppError>;
