//! Notification dispatcher trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::CustomerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{read, write};
use crate::error::{BillingError, Result};

/// A message delivered to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub customer_id: CustomerId,
    pub message: String,
    pub sent_at: DateTime<Utc>,
    pub retracted: bool,
}

/// Sends customer notifications.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Sends a message and returns the notification ID.
    async fn send(&self, customer_id: CustomerId, message: &str) -> Result<Uuid>;

    /// Withdraws a sent notification, or sends a correction where the
    /// channel cannot unsend.
    async fn retract(&self, notification_id: Uuid) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: HashMap<Uuid, Notification>,
    fail_on_send: bool,
    fail_on_retract: bool,
}

/// In-memory dispatcher for testing. Retracted notifications are kept and
/// flagged.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationDispatcher {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        write(&self.state).fail_on_send = fail;
    }

    pub fn set_fail_on_retract(&self, fail: bool) {
        write(&self.state).fail_on_retract = fail;
    }

    /// Notifications that were sent and not retracted.
    pub fn delivered(&self) -> Vec<Notification> {
        read(&self.state)
            .sent
            .values()
            .filter(|n| !n.retracted)
            .cloned()
            .collect()
    }

    pub fn retracted_count(&self) -> usize {
        read(&self.state).sent.values().filter(|n| n.retracted).count()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn send(&self, customer_id: CustomerId, message: &str) -> Result<Uuid> {
        let mut state = write(&self.state);
        if state.fail_on_send {
            return Err(BillingError::Notification(
                "notification gateway unavailable".to_string(),
            ));
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            customer_id,
            message: message.to_string(),
            sent_at: Utc::now(),
            retracted: false,
        };
        let id = notification.id;
        state.sent.insert(id, notification);
        Ok(id)
    }

    async fn retract(&self, notification_id: Uuid) -> Result<()> {
        let mut state = write(&self.state);
        if state.fail_on_retract {
            return Err(BillingError::Notification(
                "notification gateway unavailable".to_string(),
            ));
        }

        let notification = state.sent.get_mut(&notification_id).ok_or_else(|| {
            BillingError::Notification(format!("unknown notification {notification_id}"))
        })?;
        notification.retracted = true;
        Ok(())
    }
}
