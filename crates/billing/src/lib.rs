//! Bill payment on top of the saga orchestrator.
//!
//! [`PayBillUseCase`] pays a bill in six steps, each one undone by a
//! compensation if a later step fails:
//!
//! | step | compensation |
//! |---|---|
//! | `verify_bill` | none |
//! | `create_payment_record` | mark the payment `Failed`, or keep it `Refunded` |
//! | `process_payment` | refund |
//! | `mark_bill_paid` | restore `Pending` |
//! | `send_notification` | retract |
//! | `record_analytics` | remove the entry |
//!
//! After the saga finishes, exactly one `bill.payment.succeeded` or
//! `bill.payment.failed` event is published on the injected bus.

pub mod error;
pub mod events;
pub mod pay_bill;
pub mod services;

pub use error::{BillingError, Result};
pub use events::{BillPaymentEvent, PAYMENT_FAILED, PAYMENT_SUCCEEDED};
pub use pay_bill::{PayBillOutcome, PayBillRequest, PayBillResponse, PayBillUseCase};
