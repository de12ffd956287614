//! Terminal storage for events whose handler exhausted its retries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::event::DomainEvent;

/// An event a handler gave up on.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub event: DomainEvent,
    pub handler: String,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Where dead letters go for later inspection or replay.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn store(&self, letter: DeadLetter) -> Result<()>;
}

/// In-memory dead-letter sink.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterSink {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.letters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.letters.read().await.is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn store(&self, letter: DeadLetter) -> Result<()> {
        metrics::counter!("dead_letters_total", "handler" => letter.handler.clone()).increment(1);
        self.letters.write().await.push(letter);
        Ok(())
    }
}
