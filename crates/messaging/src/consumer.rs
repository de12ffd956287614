//! Retrying event consumer.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::bus::Subscription;
use crate::dead_letter::{DeadLetter, DeadLetterSink};
use crate::event::DomainEvent;
use crate::handler::EventHandler;
use crate::retry::RetryPolicy;

/// How delivery of one event to one handler ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The handler succeeded on attempt `attempts`.
    Handled { attempts: u32 },
    /// Every attempt failed; the event went to the dead-letter sink.
    DeadLettered { attempts: u32 },
}

/// Totals reported by a spawned consumer when its bus closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub handled: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub skipped: u64,
}

/// Drives one handler with bounded retries.
///
/// Each event is attempted up to `policy.max_attempts` times with an
/// exponential backoff sleep between attempts. When attempts run out the
/// event is written to the dead-letter sink exactly once. Independent of
/// any saga: it only sees events already published.
pub struct RetryingConsumer<H, D> {
    handler: Arc<H>,
    sink: Arc<D>,
    policy: RetryPolicy,
    pattern: String,
}

impl<H, D> RetryingConsumer<H, D>
where
    H: EventHandler + 'static,
    D: DeadLetterSink + 'static,
{
    /// Creates a consumer for every event type.
    pub fn new(handler: H, sink: D, policy: RetryPolicy) -> Self {
        Self {
            handler: Arc::new(handler),
            sink: Arc::new(sink),
            policy,
            pattern: "*".to_string(),
        }
    }

    /// Restricts the consumer to event types matching `pattern`, see
    /// [`DomainEvent::matches`].
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn handler_name(&self) -> &str {
        self.handler.name()
    }

    /// Delivers one event, retrying and dead-lettering as the policy says.
    #[tracing::instrument(
        skip(self, event),
        fields(handler = %self.handler.name(), event_type = %event.event_type, event_id = %event.event_id)
    )]
    pub async fn deliver(&self, event: &DomainEvent) -> Delivery {
        let mut attempt = 1;
        loop {
            match self.handler.handle(event).await {
                Ok(()) => {
                    tracing::debug!(attempt, "event handled");
                    return Delivery::Handled { attempts: attempt };
                }
                Err(error) if self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    metrics::counter!("consumer_retries_total", "handler" => self.handler.name().to_string())
                        .increment(1);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "handler failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::error!(attempts = attempt, %error, "handler exhausted retries, dead-lettering");
                    let letter = DeadLetter {
                        event: event.clone(),
                        handler: self.handler.name().to_string(),
                        attempts: attempt,
                        last_error: error.to_string(),
                        dead_lettered_at: Utc::now(),
                    };
                    if let Err(sink_error) = self.sink.store(letter).await {
                        tracing::error!(error = %sink_error, "dead letter could not be stored");
                    }
                    return Delivery::DeadLettered { attempts: attempt };
                }
            }
        }
    }

    /// Consumes `subscription` on a background task until the bus closes.
    pub fn spawn(self, mut subscription: Subscription) -> JoinHandle<ConsumerStats> {
        tokio::spawn(async move {
            let mut stats = ConsumerStats::default();
            tracing::info!(handler = %self.handler.name(), pattern = %self.pattern, "consumer started");

            while let Some(event) = subscription.recv().await {
                if !event.matches(&self.pattern) {
                    stats.skipped += 1;
                    continue;
                }
                match self.deliver(&event).await {
                    Delivery::Handled { attempts } => {
                        stats.handled += 1;
                        stats.retried += u64::from(attempts - 1);
                    }
                    Delivery::DeadLettered { attempts } => {
                        stats.dead_lettered += 1;
                        stats.retried += u64::from(attempts - 1);
                    }
                }
            }

            tracing::info!(handler = %self.handler.name(), ?stats, "consumer stopped");
            stats
        })
    }
}
