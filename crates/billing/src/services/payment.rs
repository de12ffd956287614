//! Payment store trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BillId, CustomerId, Money, PaymentId};
use serde::{Deserialize, Serialize};

use super::{read, write};
use crate::error::{BillingError, Result};

/// Status of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// A payment attempt against a bill.
///
/// Records are never deleted. A compensated payment stays behind as
/// `Failed` or `Refunded` so the attempt remains auditable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub bill_id: BillId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Processor reference, set once the charge went through.
    pub transaction_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Every status the record has held, oldest first.
    pub history: Vec<PaymentStatus>,
}

/// Persistence for payment records plus the charge and refund calls.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Creates a `Pending` payment record.
    async fn create_payment(
        &self,
        bill_id: BillId,
        customer_id: CustomerId,
        amount: Money,
    ) -> Result<PaymentRecord>;

    async fn get_payment(&self, payment_id: PaymentId) -> Result<PaymentRecord>;

    /// Charges the payment through the processor and returns the
    /// transaction reference.
    async fn process(&self, payment_id: PaymentId) -> Result<String>;

    /// Returns a processed charge to the customer.
    async fn refund(&self, payment_id: PaymentId) -> Result<()>;

    async fn update_status(&self, payment_id: PaymentId, status: PaymentStatus) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<PaymentId, PaymentRecord>,
    next_ref: u32,
    decline_reason: Option<String>,
    fail_on_create: bool,
    fail_on_refund: bool,
    fail_on_update: bool,
}

/// In-memory payment store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the processor decline every charge with `reason`.
    pub fn set_decline(&self, reason: Option<&str>) {
        write(&self.state).decline_reason = reason.map(str::to_string);
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        write(&self.state).fail_on_create = fail;
    }

    pub fn set_fail_on_refund(&self, fail: bool) {
        write(&self.state).fail_on_refund = fail;
    }

    pub fn set_fail_on_update(&self, fail: bool) {
        write(&self.state).fail_on_update = fail;
    }

    pub fn payments(&self) -> Vec<PaymentRecord> {
        read(&self.state).payments.values().cloned().collect()
    }

    pub fn payment_count(&self) -> usize {
        read(&self.state).payments.len()
    }
}

fn transition(record: &mut PaymentRecord, status: PaymentStatus) {
    record.status = status;
    record.history.push(status);
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_payment(
        &self,
        bill_id: BillId,
        customer_id: CustomerId,
        amount: Money,
    ) -> Result<PaymentRecord> {
        let mut state = write(&self.state);
        if state.fail_on_create {
            return Err(BillingError::PaymentStore(
                "payment database unavailable".to_string(),
            ));
        }

        let record = PaymentRecord {
            id: PaymentId::new(),
            bill_id,
            customer_id,
            amount,
            status: PaymentStatus::Pending,
            transaction_ref: None,
            created_at: Utc::now(),
            history: vec![PaymentStatus::Pending],
        };
        state.payments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<PaymentRecord> {
        read(&self.state)
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or(BillingError::PaymentNotFound(payment_id))
    }

    async fn process(&self, payment_id: PaymentId) -> Result<String> {
        let mut state = write(&self.state);
        if let Some(reason) = state.decline_reason.clone() {
            return Err(BillingError::PaymentDeclined(reason));
        }

        state.next_ref += 1;
        let transaction_ref = format!("TXN-{:06}", state.next_ref);
        let record = state
            .payments
            .get_mut(&payment_id)
            .ok_or(BillingError::PaymentNotFound(payment_id))?;
        record.transaction_ref = Some(transaction_ref.clone());
        transition(record, PaymentStatus::Completed);
        Ok(transaction_ref)
    }

    async fn refund(&self, payment_id: PaymentId) -> Result<()> {
        let mut state = write(&self.state);
        if state.fail_on_refund {
            return Err(BillingError::PaymentStore(
                "refund rejected by processor".to_string(),
            ));
        }

        let record = state
            .payments
            .get_mut(&payment_id)
            .ok_or(BillingError::PaymentNotFound(payment_id))?;
        transition(record, PaymentStatus::Refunded);
        Ok(())
    }

    async fn update_status(&self, payment_id: PaymentId, status: PaymentStatus) -> Result<()> {
        let mut state = write(&self.state);
        if state.fail_on_update {
            return Err(BillingError::PaymentStore(
                "payment database unavailable".to_string(),
            ));
        }

        let record = state
            .payments
            .get_mut(&payment_id)
            .ok_or(BillingError::PaymentNotFound(payment_id))?;
        transition(record, status);
        Ok(())
    }
}
