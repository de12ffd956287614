//! The domain event envelope.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// A settled business fact, published for other subsystems to react to.
///
/// `event_type` is a dotted name such as `bill.payment.succeeded`;
/// consumers select events with [`matches`](Self::matches).
/// `correlation_id` ties the event to the saga run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub correlation_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl DomainEvent {
    /// Creates an event with a serialized payload.
    pub fn new<T: Serialize>(event_type: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self::from_value(event_type, serde_json::to_value(payload)?))
    }

    /// Creates an event from an already-built JSON payload.
    pub fn from_value(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            correlation_id: None,
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<Uuid>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Deserializes the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Matches the event type against a pattern.
    ///
    /// `*` matches everything, `prefix.*` matches any type under `prefix.`,
    /// anything else must match exactly.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        match pattern.strip_suffix(".*") {
            Some(prefix) => self
                .event_type
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => self.event_type == pattern,
        }
    }
}
