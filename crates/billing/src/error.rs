//! Billing error types.

use common::{BillId, PaymentId};
use messaging::MessagingError;
use saga::{SagaError, StepError};
use thiserror::Error;

use crate::services::billing::BillStatus;

/// Errors raised by the billing collaborators and the pay-bill use case.
#[derive(Debug, Error)]
pub enum BillingError {
    /// No bill with this ID exists.
    #[error("Bill not found: {0}")]
    BillNotFound(BillId),

    /// The bill cannot be paid in its current status.
    #[error("Bill {bill_id} is not payable: status is {status}")]
    BillNotPayable { bill_id: BillId, status: BillStatus },

    /// The request does not match the bill on record.
    #[error("Bill {bill_id} does not match request: {reason}")]
    BillMismatch { bill_id: BillId, reason: String },

    /// Optimistic version check failed on a bill update.
    #[error("Bill {bill_id} was modified concurrently: expected version {expected}, found {actual}")]
    VersionConflict {
        bill_id: BillId,
        expected: u64,
        actual: u64,
    },

    /// No payment record with this ID exists.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// The payment processor refused the charge.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// Billing store error.
    #[error("Billing store error: {0}")]
    BillingStore(String),

    /// Payment store error.
    #[error("Payment store error: {0}")]
    PaymentStore(String),

    /// Notification dispatcher error.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Analytics store error.
    #[error("Analytics error: {0}")]
    Analytics(String),

    /// The saga definition was rejected.
    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),

    /// Messaging error.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
}

impl From<BillingError> for StepError {
    fn from(err: BillingError) -> Self {
        StepError::caused_by(err)
    }
}

/// Convenience type alias for billing results.
pub type Result<T> = std::result::Result<T, BillingError>;
