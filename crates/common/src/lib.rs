//! Shared identifiers and value objects.
//!
//! Every crate in the workspace speaks in terms of these types, so a saga
//! identifier can never be confused with a bill or payment identifier.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{BillId, CustomerId, PaymentId, SagaId};
