//! Analytics store trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BillId, CustomerId, Money};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{read, write};
use crate::error::{BillingError, Result};

/// One recorded payment for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEntry {
    pub id: Uuid,
    pub bill_id: BillId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub recorded_at: DateTime<Utc>,
}

impl AnalyticsEntry {
    pub fn new(bill_id: BillId, customer_id: CustomerId, amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            bill_id,
            customer_id,
            amount,
            recorded_at: Utc::now(),
        }
    }
}

/// Reporting data store.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Stores an entry and returns its ID.
    async fn record(&self, entry: AnalyticsEntry) -> Result<Uuid>;

    async fn remove(&self, entry_id: Uuid) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryAnalyticsState {
    entries: HashMap<Uuid, AnalyticsEntry>,
    fail_on_record: bool,
    fail_on_remove: bool,
}

/// In-memory analytics store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAnalyticsStore {
    state: Arc<RwLock<InMemoryAnalyticsState>>,
}

impl InMemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_record(&self, fail: bool) {
        write(&self.state).fail_on_record = fail;
    }

    pub fn set_fail_on_remove(&self, fail: bool) {
        write(&self.state).fail_on_remove = fail;
    }

    pub fn entries(&self) -> Vec<AnalyticsEntry> {
        read(&self.state).entries.values().cloned().collect()
    }

    /// Sum of all recorded amounts.
    pub fn total(&self) -> Money {
        read(&self.state)
            .entries
            .values()
            .fold(Money::zero(), |sum, entry| sum + entry.amount)
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryAnalyticsStore {
    async fn record(&self, entry: AnalyticsEntry) -> Result<Uuid> {
        let mut state = write(&self.state);
        if state.fail_on_record {
            return Err(BillingError::Analytics(
                "analytics store unavailable".to_string(),
            ));
        }

        let id = entry.id;
        state.entries.insert(id, entry);
        Ok(id)
    }

    async fn remove(&self, entry_id: Uuid) -> Result<()> {
        let mut state = write(&self.state);
        if state.fail_on_remove {
            return Err(BillingError::Analytics(
                "analytics store unavailable".to_string(),
            ));
        }

        // Removing an absent entry leaves the store as if it was never
        // recorded, which is what callers want.
        state.entries.remove(&entry_id);
        Ok(())
    }
}
