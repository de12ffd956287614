//! Message bus trait and in-process broadcast implementation.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use crate::error::{MessagingError, Result};
use crate::event::DomainEvent;

/// Publishes domain events to whoever is listening.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes one event. Fails only if the bus is closed.
    async fn publish(&self, event: DomainEvent) -> Result<()>;
}

struct BusInner {
    sender: RwLock<Option<broadcast::Sender<DomainEvent>>>,
    history: RwLock<VecDeque<DomainEvent>>,
    capacity: usize,
}

/// An in-process bus backed by a `tokio` broadcast channel.
///
/// Constructed explicitly by application startup and passed to the code
/// that publishes. Every [`Subscription`] sees every event published after
/// it subscribed. A subscriber that falls more than `capacity` events
/// behind skips the oldest ones.
///
/// Cloning shares the same bus.
#[derive(Clone)]
pub struct InMemoryMessageBus {
    inner: Arc<BusInner>,
}

impl InMemoryMessageBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        tracing::info!(capacity, "message bus created");
        Self {
            inner: Arc::new(BusInner {
                sender: RwLock::new(Some(sender)),
                history: RwLock::new(VecDeque::with_capacity(capacity)),
                capacity,
            }),
        }
    }

    /// Registers a new listener.
    pub async fn subscribe(&self) -> Result<Subscription> {
        let guard = self.inner.sender.read().await;
        let sender = guard.as_ref().ok_or(MessagingError::BusClosed)?;
        tracing::debug!(subscribers = sender.receiver_count() + 1, "bus subscriber added");
        Ok(Subscription {
            receiver: sender.subscribe(),
        })
    }

    /// The most recent events published, oldest first, up to `capacity`.
    pub async fn published(&self) -> Vec<DomainEvent> {
        self.inner.history.read().await.iter().cloned().collect()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner
            .sender
            .read()
            .await
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.sender.read().await.is_none()
    }

    /// Closes the bus. Subscribers drain what is already buffered and then
    /// see the end of their stream; later publishes fail.
    pub async fn shutdown(&self) {
        if self.inner.sender.write().await.take().is_some() {
            tracing::info!("message bus shut down");
        }
    }
}

impl std::fmt::Debug for InMemoryMessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMessageBus")
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type, event_id = %event.event_id))]
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let guard = self.inner.sender.read().await;
        let sender = guard.as_ref().ok_or(MessagingError::BusClosed)?;

        {
            let mut history = self.inner.history.write().await;
            if history.len() == self.inner.capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        match sender.send(event) {
            Ok(receivers) => tracing::debug!(receivers, "event published"),
            // No listeners is not an error for pub/sub.
            Err(_) => tracing::debug!("event published with no subscribers"),
        }
        metrics::counter!("bus_events_published_total").increment(1);
        Ok(())
    }
}

/// A listener's view of the bus.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the bus is shut down
    /// and everything buffered has been received.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    metrics::counter!("bus_events_skipped_total").increment(skipped);
                    tracing::warn!(skipped, "subscriber lagged, oldest events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(kind: &str) -> DomainEvent {
        DomainEvent::from_value(kind, json!({}))
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_every_event() {
        let bus = InMemoryMessageBus::new(16);
        let mut first = bus.subscribe().await.unwrap();
        let mut second = bus.subscribe().await.unwrap();
        assert_eq!(bus.subscriber_count().await, 2);

        bus.publish(event("a")).await.unwrap();
        bus.publish(event("b")).await.unwrap();

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.recv().await.unwrap().event_type, "a");
            assert_eq!(sub.recv().await.unwrap().event_type, "b");
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_recorded() {
        let bus = InMemoryMessageBus::new(4);
        bus.publish(event("a")).await.unwrap();

        let published = bus.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type, "a");
    }

    #[tokio::test]
    async fn test_history_is_bounded_by_capacity() {
        let bus = InMemoryMessageBus::new(2);
        for kind in ["a", "b", "c"] {
            bus.publish(event(kind)).await.unwrap();
        }

        let kinds: Vec<_> = bus
            .published()
            .await
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(kinds, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_ends_stream() {
        let bus = InMemoryMessageBus::new(8);
        let mut sub = bus.subscribe().await.unwrap();

        bus.publish(event("last")).await.unwrap();
        bus.shutdown().await;

        assert!(bus.is_closed().await);
        assert_eq!(sub.recv().await.unwrap().event_type, "last");
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_publish_and_subscribe() {
        let bus = InMemoryMessageBus::new(8);
        bus.shutdown().await;

        assert!(matches!(
            bus.publish(event("late")).await,
            Err(MessagingError::BusClosed)
        ));
        assert!(matches!(
            bus.subscribe().await,
            Err(MessagingError::BusClosed)
        ));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let bus = InMemoryMessageBus::new(2);
        let mut sub = bus.subscribe().await.unwrap();

        for kind in ["a", "b", "c", "d"] {
            bus.publish(event(kind)).await.unwrap();
        }

        assert_eq!(sub.recv().await.unwrap().event_type, "c");
        assert_eq!(sub.recv().await.unwrap().event_type, "d");
    }
}
