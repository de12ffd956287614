//! Integration tests: bus → spawned retrying consumers → dead-letter sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use messaging::{
    ConsumerStats, DomainEvent, EventHandler, HandlerError, InMemoryDeadLetterSink,
    InMemoryMessageBus, MessageBus, RetryPolicy, RetryingConsumer,
};
use serde_json::json;
use tokio::sync::Mutex;

/// Records event types it sees; fails for types listed in `reject`.
#[derive(Clone, Default)]
struct Recording {
    seen: Arc<Mutex<Vec<String>>>,
    reject: Vec<&'static str>,
}

#[async_trait]
impl EventHandler for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        self.seen.lock().await.push(event.event_type.clone());
        if self.reject.iter().any(|r| *r == event.event_type) {
            return Err(HandlerError::new("downstream unavailable"));
        }
        Ok(())
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5))
}

#[tokio::test]
async fn test_consumer_handles_until_bus_closes() {
    let bus = InMemoryMessageBus::new(32);
    let sink = InMemoryDeadLetterSink::new();
    let handler = Recording::default();

    let task = RetryingConsumer::new(handler.clone(), sink.clone(), fast_policy())
        .spawn(bus.subscribe().await.unwrap());

    for kind in ["bill.payment.succeeded", "bill.payment.failed"] {
        bus.publish(DomainEvent::from_value(kind, json!({}))).await.unwrap();
    }
    bus.shutdown().await;

    let stats = task.await.unwrap();
    assert_eq!(
        stats,
        ConsumerStats {
            handled: 2,
            ..ConsumerStats::default()
        }
    );
    assert_eq!(
        *handler.seen.lock().await,
        vec!["bill.payment.succeeded", "bill.payment.failed"]
    );
    assert!(sink.is_empty().await);
}

#[tokio::test]
async fn test_pattern_filters_events() {
    let bus = InMemoryMessageBus::new(32);
    let sink = InMemoryDeadLetterSink::new();
    let handler = Recording::default();

    let task = RetryingConsumer::new(handler.clone(), sink, fast_policy())
        .with_pattern("bill.payment.failed")
        .spawn(bus.subscribe().await.unwrap());

    bus.publish(DomainEvent::from_value("bill.payment.succeeded", json!({})))
        .await
        .unwrap();
    bus.publish(DomainEvent::from_value("bill.payment.failed", json!({})))
        .await
        .unwrap();
    bus.shutdown().await;

    let stats = task.await.unwrap();
    assert_eq!(stats.handled, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(*handler.seen.lock().await, vec!["bill.payment.failed"]);
}

#[tokio::test]
async fn test_failing_handler_dead_letters_and_keeps_consuming() {
    let bus = InMemoryMessageBus::new(32);
    let sink = InMemoryDeadLetterSink::new();
    let handler = Recording {
        reject: vec!["bill.payment.failed"],
        ..Recording::default()
    };

    let task = RetryingConsumer::new(handler.clone(), sink.clone(), fast_policy())
        .spawn(bus.subscribe().await.unwrap());

    bus.publish(DomainEvent::from_value("bill.payment.failed", json!({})))
        .await
        .unwrap();
    bus.publish(DomainEvent::from_value("bill.payment.succeeded", json!({})))
        .await
        .unwrap();
    bus.shutdown().await;

    let stats = task.await.unwrap();
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.handled, 1);

    let letters = sink.letters().await;
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].event.event_type, "bill.payment.failed");
    assert_eq!(letters[0].attempts, 2);
    assert_eq!(letters[0].last_error, "downstream unavailable");
}

#[tokio::test]
async fn test_independent_consumers_each_see_every_event() {
    let bus = InMemoryMessageBus::new(32);
    let first = Recording::default();
    let second = Recording::default();

    let tasks = vec![
        RetryingConsumer::new(first.clone(), InMemoryDeadLetterSink::new(), fast_policy())
            .spawn(bus.subscribe().await.unwrap()),
        RetryingConsumer::new(second.clone(), InMemoryDeadLetterSink::new(), fast_policy())
            .spawn(bus.subscribe().await.unwrap()),
    ];

    bus.publish(DomainEvent::from_value("bill.payment.succeeded", json!({})))
        .await
        .unwrap();
    bus.shutdown().await;

    for task in tasks {
        assert_eq!(task.await.unwrap().handled, 1);
    }
    assert_eq!(first.seen.lock().await.len(), 1);
    assert_eq!(second.seen.lock().await.len(), 1);
}
