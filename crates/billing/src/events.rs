//! Outcome events published after a pay-bill saga finishes.

use chrono::{DateTime, Utc};
use common::{BillId, CustomerId, Money, PaymentId, SagaId};
use messaging::{DomainEvent, MessagingError};
use serde::{Deserialize, Serialize};

/// Event type for a bill that was paid.
pub const PAYMENT_SUCCEEDED: &str = "bill.payment.succeeded";

/// Event type for a payment attempt that was rolled back.
pub const PAYMENT_FAILED: &str = "bill.payment.failed";

/// The one outcome event of a pay-bill run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BillPaymentEvent {
    Succeeded(PaymentSucceededData),
    Failed(PaymentFailedData),
}

/// Data for a successful payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceededData {
    pub saga_id: SagaId,
    pub bill_id: BillId,
    pub customer_id: CustomerId,
    pub payment_id: Option<PaymentId>,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}

/// Data for a failed payment.
///
/// Internal only: carries the failed step and reason for the consumers
/// that audit failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub saga_id: SagaId,
    pub bill_id: BillId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub failed_step: Option<String>,
    pub reason: Option<String>,
    /// Some compensation failed and the stores may be inconsistent.
    pub needs_manual_intervention: bool,
    pub failed_at: DateTime<Utc>,
}

impl BillPaymentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BillPaymentEvent::Succeeded(_) => PAYMENT_SUCCEEDED,
            BillPaymentEvent::Failed(_) => PAYMENT_FAILED,
        }
    }

    pub fn saga_id(&self) -> SagaId {
        match self {
            BillPaymentEvent::Succeeded(data) => data.saga_id,
            BillPaymentEvent::Failed(data) => data.saga_id,
        }
    }

    /// Wraps the event in a bus envelope correlated with its saga run.
    pub fn into_domain_event(self) -> Result<DomainEvent, MessagingError> {
        let event = match &self {
            BillPaymentEvent::Succeeded(data) => DomainEvent::new(PAYMENT_SUCCEEDED, data)?,
            BillPaymentEvent::Failed(data) => DomainEvent::new(PAYMENT_FAILED, data)?,
        };
        Ok(event.with_correlation(self.saga_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> BillPaymentEvent {
        BillPaymentEvent::Failed(PaymentFailedData {
            saga_id: SagaId::new(),
            bill_id: BillId::new(),
            customer_id: CustomerId::new(),
            amount: Money::from_cents(1999),
            failed_step: Some("process_payment".to_string()),
            reason: Some("Payment declined: insufficient funds".to_string()),
            needs_manual_intervention: false,
            failed_at: Utc::now(),
        })
    }

    #[test]
    fn test_envelope_is_correlated_with_saga() {
        let event = failed();
        let saga_id = event.saga_id();

        let envelope = event.into_domain_event().unwrap();
        assert_eq!(envelope.event_type, PAYMENT_FAILED);
        assert_eq!(envelope.correlation_id, Some(saga_id.as_uuid()));
        assert_eq!(envelope.payload["amount"], 1999);
        assert_eq!(envelope.payload["failed_step"], "process_payment");
    }

    #[test]
    fn test_payload_reads_back() {
        let BillPaymentEvent::Failed(data) = failed() else {
            unreachable!()
        };
        let envelope = BillPaymentEvent::Failed(data.clone())
            .into_domain_event()
            .unwrap();
        assert_eq!(envelope.payload_as::<PaymentFailedData>().unwrap(), data);
    }

    #[test]
    fn test_tagged_serialization() {
        let json = serde_json::to_value(failed()).unwrap();
        assert_eq!(json["type"], "Failed");
        assert!(json["data"]["saga_id"].is_string());
    }
}
