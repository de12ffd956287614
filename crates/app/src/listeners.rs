//! Bus listeners that react to pay-bill outcomes.

use std::sync::Arc;

use async_trait::async_trait;
use billing::events::PaymentFailedData;
use billing::{PAYMENT_FAILED, PAYMENT_SUCCEEDED};
use chrono::{DateTime, Utc};
use messaging::{DomainEvent, EventHandler, HandlerError};
use tokio::sync::RwLock;
use uuid::Uuid;

/// One line of the payment audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub event_type: String,
    pub saga_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// Keeps every pay-bill outcome it sees.
#[derive(Debug, Clone, Default)]
pub struct PaymentAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl PaymentAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Counts of (succeeded, failed) outcomes.
    pub async fn tally(&self) -> (usize, usize) {
        let entries = self.entries.read().await;
        let succeeded = entries
            .iter()
            .filter(|e| e.event_type == PAYMENT_SUCCEEDED)
            .count();
        let failed = entries
            .iter()
            .filter(|e| e.event_type == PAYMENT_FAILED)
            .count();
        (succeeded, failed)
    }
}

#[async_trait]
impl EventHandler for PaymentAuditLog {
    fn name(&self) -> &str {
        "payment_audit_log"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        tracing::info!(
            event_type = %event.event_type,
            saga_id = ?event.correlation_id,
            "payment outcome recorded"
        );
        self.entries.write().await.push(AuditEntry {
            event_type: event.event_type.clone(),
            saga_id: event.correlation_id,
            occurred_at: event.occurred_at,
        });
        Ok(())
    }
}

/// Raises an alert for failed payments whose rollback did not complete.
///
/// Only meant for `bill.payment.failed`; a payload that does not decode is
/// a handler failure and ends up dead-lettered.
#[derive(Debug, Clone, Default)]
pub struct ManualInterventionAlert {
    flagged: Arc<RwLock<Vec<PaymentFailedData>>>,
}

impl ManualInterventionAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn flagged(&self) -> Vec<PaymentFailedData> {
        self.flagged.read().await.clone()
    }
}

#[async_trait]
impl EventHandler for ManualInterventionAlert {
    fn name(&self) -> &str {
        "manual_intervention_alert"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let data: PaymentFailedData = event.payload_as()?;
        if !data.needs_manual_intervention {
            return Ok(());
        }

        metrics::counter!("manual_interventions_total").increment(1);
        tracing::error!(
            saga_id = %data.saga_id,
            bill_id = %data.bill_id,
            failed_step = ?data.failed_step,
            "payment rollback incomplete, manual intervention required"
        );
        self.flagged.write().await.push(data);
        Ok(())
    }
}
