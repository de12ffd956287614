//! Event handler trait.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::event::DomainEvent;

/// Reacts to one domain event.
///
/// Handlers must tolerate seeing the same event more than once: a failed
/// attempt is retried by [`RetryingConsumer`](crate::RetryingConsumer).
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and dead letters.
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}
