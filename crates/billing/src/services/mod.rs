//! Collaborator store traits and in-memory implementations.
//!
//! The saga steps call into these opaquely. The in-memory versions carry
//! failure switches so tests can make any individual call fail.

pub mod analytics;
pub mod billing;
pub mod notification;
pub mod payment;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use analytics::{AnalyticsEntry, AnalyticsStore, InMemoryAnalyticsStore};
pub use billing::{Bill, BillStatus, BillingStore, InMemoryBillingStore};
pub use notification::{InMemoryNotificationDispatcher, Notification, NotificationDispatcher};
pub use payment::{InMemoryPaymentStore, PaymentRecord, PaymentStatus, PaymentStore};

// In-memory state is plain data, so a panic mid-update cannot leave it
// half-written in a way later readers care about.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
