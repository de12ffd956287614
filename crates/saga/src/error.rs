//! Saga error types.

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// The error a step reports from `execute` or `compensate`.
///
/// Cheap to clone so it can live inside a [`SagaResult`](crate::SagaResult)
/// and still be logged or forwarded by the caller. The underlying cause, if
/// any, is kept behind an `Arc` and exposed through
/// [`std::error::Error::source`].
#[derive(Debug, Clone)]
pub struct StepError {
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StepError {
    /// Creates an error from a plain message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a lower-level error, using its `Display` output as the message.
    pub fn caused_by<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    /// The error produced when a step's external call exceeds its time limit.
    pub fn timed_out(step: &str, limit: Duration) -> Self {
        Self::new(format!("step '{step}' timed out after {}ms", limit.as_millis()))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}

// Audit records carry the message only.
impl Serialize for StepError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.message)
    }
}

/// Errors that can occur during saga operations.
///
/// The `EmptyDefinition`, `EmptyStepName` and `DuplicateStepName` variants
/// are precondition failures: `execute_saga` returns them before any step
/// runs. `StepFailed` and `CompensationFailed` describe outcomes inside a
/// run and are only ever handed out as values, never returned as `Err`.
#[derive(Debug, Clone, Error)]
pub enum SagaError {
    /// The definition contains no steps.
    #[error("Saga '{saga}' has no steps")]
    EmptyDefinition { saga: String },

    /// A step reported an empty name.
    #[error("Saga '{saga}' has a step with an empty name at position {position}")]
    EmptyStepName { saga: String, position: usize },

    /// Two steps in the same definition share a name.
    #[error("Saga '{saga}' declares step '{step}' more than once")]
    DuplicateStepName { saga: String, step: String },

    /// A forward step failed.
    #[error("Saga step '{step}' failed: {source}")]
    StepFailed { step: String, source: StepError },

    /// A compensation step failed. Needs manual intervention.
    #[error("Compensation step '{step}' failed: {source}")]
    CompensationFailed { step: String, source: StepError },
}

impl SagaError {
    /// Returns true for errors raised before any step executed.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SagaError::EmptyDefinition { .. }
                | SagaError::EmptyStepName { .. }
                | SagaError::DuplicateStepName { .. }
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
