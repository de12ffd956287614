//! Billing store trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{BillId, CustomerId, Money};
use serde::{Deserialize, Serialize};

use super::{read, write};
use crate::error::{BillingError, Result};

/// Where a bill is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Pending,
    Paid,
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillStatus::Pending => f.write_str("pending"),
            BillStatus::Paid => f.write_str("paid"),
        }
    }
}

/// A bill owed by a customer.
///
/// `version` increases on every update and guards against concurrent
/// writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub status: BillStatus,
    pub version: u64,
}

impl Bill {
    /// Creates a pending bill at version 0.
    pub fn new(customer_id: CustomerId, amount: Money) -> Self {
        Self {
            id: BillId::new(),
            customer_id,
            amount,
            status: BillStatus::Pending,
            version: 0,
        }
    }
}

/// Read and update access to bill records.
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn get_bill(&self, bill_id: BillId) -> Result<Bill>;

    /// Sets the bill's status if its version still equals
    /// `expected_version`, returning the updated bill.
    async fn update_status(
        &self,
        bill_id: BillId,
        status: BillStatus,
        expected_version: u64,
    ) -> Result<Bill>;
}

#[derive(Debug, Default)]
struct InMemoryBillingState {
    bills: HashMap<BillId, Bill>,
    fail_on_update: bool,
    fail_on_restore: bool,
}

/// In-memory billing store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<RwLock<InMemoryBillingState>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bill, replacing any bill with the same ID.
    pub fn insert(&self, bill: Bill) {
        write(&self.state).bills.insert(bill.id, bill);
    }

    pub fn bill(&self, bill_id: BillId) -> Option<Bill> {
        read(&self.state).bills.get(&bill_id).cloned()
    }

    /// Makes every update to `Paid` fail.
    pub fn set_fail_on_update(&self, fail: bool) {
        write(&self.state).fail_on_update = fail;
    }

    /// Makes every update back to `Pending` fail.
    pub fn set_fail_on_restore(&self, fail: bool) {
        write(&self.state).fail_on_restore = fail;
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn get_bill(&self, bill_id: BillId) -> Result<Bill> {
        self.bill(bill_id).ok_or(BillingError::BillNotFound(bill_id))
    }

    async fn update_status(
        &self,
        bill_id: BillId,
        status: BillStatus,
        expected_version: u64,
    ) -> Result<Bill> {
        let mut state = write(&self.state);

        let failing = match status {
            BillStatus::Paid => state.fail_on_update,
            BillStatus::Pending => state.fail_on_restore,
        };
        if failing {
            return Err(BillingError::BillingStore(
                "billing database unavailable".to_string(),
            ));
        }

        let bill = state
            .bills
            .get_mut(&bill_id)
            .ok_or(BillingError::BillNotFound(bill_id))?;
        if bill.version != expected_version {
            return Err(BillingError::VersionConflict {
                bill_id,
                expected: expected_version,
                actual: bill.version,
            });
        }

        bill.status = status;
        bill.version += 1;
        Ok(bill.clone())
    }
}
