//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The lifecycle of one saga run.
///
/// ```text
/// Running ──┬──► Completed
///           └──► Compensating ──► Failed
/// ```
///
/// `Failed` is reached once the compensation sweep has visited every
/// completed step, whether or not each compensation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaState {
    /// Forward steps are executing.
    Running,

    /// A step failed; completed steps are being undone in reverse order.
    Compensating,

    /// Every step succeeded (terminal).
    Completed,

    /// A step failed and the compensation sweep finished (terminal).
    Failed,
}

impl SagaState {
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Running => "running",
            SagaState::Compensating => "compensating",
            SagaState::Completed => "completed",
            SagaState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
