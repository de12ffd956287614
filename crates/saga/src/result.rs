//! The record of one saga run.

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::Serialize;

use crate::error::{SagaError, StepError};
use crate::state::SagaState;

/// How a single compensation in the sweep ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompensationOutcome {
    Compensated,
    Failed { error: StepError },
}

/// One entry of the compensation sweep, in the order it ran.
#[derive(Debug, Clone, Serialize)]
pub struct CompensationRecord {
    pub step: String,
    pub outcome: CompensationOutcome,
}

impl CompensationRecord {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, CompensationOutcome::Failed { .. })
    }

    /// The failure as a [`SagaError::CompensationFailed`], if this
    /// compensation failed.
    pub fn to_error(&self) -> Option<SagaError> {
        match &self.outcome {
            CompensationOutcome::Failed { error } => Some(SagaError::CompensationFailed {
                step: self.step.clone(),
                source: error.clone(),
            }),
            CompensationOutcome::Compensated => None,
        }
    }
}

/// What happened during one call to
/// [`SagaOrchestrator::execute_saga`](crate::SagaOrchestrator::execute_saga).
///
/// Built by the orchestrator and read-only once returned:
///
/// - `completed_steps` is always a prefix of the definition's step names;
/// - on success it holds every name and `failed_step`/`error` are `None`;
/// - on failure `failed_step` is the first step whose `execute` failed and
///   `completed_steps` holds exactly the steps before it.
///
/// Serializes to JSON for callers that keep an audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct SagaResult {
    saga_id: SagaId,
    saga_name: String,
    success: bool,
    state: SagaState,
    completed_steps: Vec<String>,
    failed_step: Option<String>,
    error: Option<StepError>,
    compensations: Vec<CompensationRecord>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl SagaResult {
    pub(crate) fn start(saga_id: SagaId, saga_name: &str, capacity: usize) -> Self {
        Self {
            saga_id,
            saga_name: saga_name.to_string(),
            success: false,
            state: SagaState::Running,
            completed_steps: Vec::with_capacity(capacity),
            failed_step: None,
            error: None,
            compensations: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn record_completed(&mut self, step: String) {
        debug_assert_eq!(self.state, SagaState::Running);
        self.completed_steps.push(step);
    }

    pub(crate) fn begin_compensation(&mut self, step: String, error: StepError) {
        debug_assert!(self.state.can_compensate());
        self.failed_step = Some(step);
        self.error = Some(error);
        self.state = SagaState::Compensating;
    }

    pub(crate) fn record_compensation(&mut self, step: String, outcome: CompensationOutcome) {
        debug_assert_eq!(self.state, SagaState::Compensating);
        self.compensations.push(CompensationRecord { step, outcome });
    }

    pub(crate) fn finish(mut self) -> Self {
        debug_assert!(!self.state.is_terminal());
        self.success = self.failed_step.is_none();
        self.state = if self.success {
            SagaState::Completed
        } else {
            SagaState::Failed
        };
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub fn saga_name(&self) -> &str {
        &self.saga_name
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Names of the steps whose `execute` succeeded, in execution order.
    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    /// Name of the step whose `execute` failed, if any.
    pub fn failed_step(&self) -> Option<&str> {
        self.failed_step.as_deref()
    }

    /// The error captured from the failed step, if any.
    pub fn error(&self) -> Option<&StepError> {
        self.error.as_ref()
    }

    /// The compensation sweep, most recently completed step first.
    pub fn compensations(&self) -> &[CompensationRecord] {
        &self.compensations
    }

    /// Steps whose compensation failed, in sweep order.
    pub fn failed_compensations(&self) -> impl Iterator<Item = &str> {
        self.compensations
            .iter()
            .filter(|c| c.is_failure())
            .map(|c| c.step.as_str())
    }

    /// Every failed compensation as a [`SagaError::CompensationFailed`], in
    /// sweep order.
    pub fn compensation_errors(&self) -> Vec<SagaError> {
        self.compensations
            .iter()
            .filter_map(CompensationRecord::to_error)
            .collect()
    }

    /// True when some compensation failed and an external resource may be
    /// left in a partially applied state.
    pub fn needs_manual_intervention(&self) -> bool {
        self.compensations.iter().any(CompensationRecord::is_failure)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// The failure as a [`SagaError::StepFailed`], for callers that want to
    /// propagate it with `?`.
    pub fn to_error(&self) -> Option<SagaError> {
        match (&self.failed_step, &self.error) {
            (Some(step), Some(error)) => Some(SagaError::StepFailed {
                step: step.clone(),
                source: error.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_run() -> SagaResult {
        let mut result = SagaResult::start(SagaId::new(), "PayBill", 3);
        result.record_completed("verify_bill".to_string());
        result.record_completed("create_payment_record".to_string());
        result.begin_compensation(
            "process_payment".to_string(),
            StepError::new("insufficient funds"),
        );
        result.record_compensation(
            "create_payment_record".to_string(),
            CompensationOutcome::Failed {
                error: StepError::new("payment store unavailable"),
            },
        );
        result.record_compensation("verify_bill".to_string(), CompensationOutcome::Compensated);
        result.finish()
    }

    #[test]
    fn successful_run_has_no_failure_fields() {
        let mut result = SagaResult::start(SagaId::new(), "PayBill", 1);
        result.record_completed("verify_bill".to_string());
        let result = result.finish();

        assert!(result.success());
        assert_eq!(result.state(), SagaState::Completed);
        assert!(result.failed_step().is_none());
        assert!(result.error().is_none());
        assert!(result.to_error().is_none());
        assert!(result.finished_at().is_some());
    }

    #[test]
    fn failed_run_reports_failure_and_sweep() {
        let result = failed_run();

        assert!(!result.success());
        assert_eq!(result.state(), SagaState::Failed);
        assert_eq!(result.failed_step(), Some("process_payment"));
        assert_eq!(result.error().unwrap().message(), "insufficient funds");
        assert!(result.needs_manual_intervention());
        assert_eq!(
            result.failed_compensations().collect::<Vec<_>>(),
            vec!["create_payment_record"]
        );
        assert!(matches!(
            result.to_error(),
            Some(SagaError::StepFailed { step, .. }) if step == "process_payment"
        ));
    }

    #[test]
    fn failed_compensations_convert_to_errors() {
        let result = failed_run();

        let errors = result.compensation_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "Compensation step 'create_payment_record' failed: payment store unavailable"
        );
        assert!(result.compensations()[1].to_error().is_none());
    }

    #[test]
    fn serializes_for_audit() {
        let json = serde_json::to_value(failed_run()).unwrap();

        assert_eq!(json["saga_name"], "PayBill");
        assert_eq!(json["success"], false);
        assert_eq!(json["state"], "failed");
        assert_eq!(json["failed_step"], "process_payment");
        assert_eq!(json["error"], "insufficient funds");
        assert_eq!(json["compensations"][0]["status"], "failed");
        assert_eq!(json["compensations"][0]["error"], "payment store unavailable");
        assert_eq!(json["compensations"][1]["status"], "compensated");
    }
}
