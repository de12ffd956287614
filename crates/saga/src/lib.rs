//! Saga orchestration for multi-store business operations.
//!
//! A saga is an ordered list of steps, each pairing a forward action with a
//! compensating action. The [`SagaOrchestrator`] runs the steps strictly in
//! order. When a step fails, every step that already completed is
//! compensated in reverse order, and the outcome is captured in a
//! [`SagaResult`] rather than returned as an error.
//!
//! ```text
//! execute(1) ─► execute(2) ─► execute(3) ✗
//!                                  │
//!     compensate(1) ◄─ compensate(2)
//! ```
//!
//! Only a malformed [`SagaDefinition`] (no steps, an empty step name, or a
//! duplicated step name) is reported as an `Err`, before any step runs.

pub mod definition;
pub mod error;
pub mod orchestrator;
pub mod result;
pub mod state;
pub mod step;

pub use common::SagaId;
pub use definition::SagaDefinition;
pub use error::{Result, SagaError, StepError};
pub use orchestrator::SagaOrchestrator;
pub use result::{CompensationOutcome, CompensationRecord, SagaResult};
pub use state::SagaState;
pub use step::{BoxedStep, FnStep, SagaStep, step, step_without_compensation, with_timeout};
