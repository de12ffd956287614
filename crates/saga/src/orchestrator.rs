//! Saga orchestrator: forward pass and reverse compensation sweep.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use common::SagaId;
use futures_util::FutureExt;

use crate::definition::SagaDefinition;
use crate::error::{SagaError, StepError};
use crate::result::{CompensationOutcome, SagaResult};
use crate::step::{BoundStep, BoxedStep};

/// Runs saga definitions.
///
/// The orchestrator holds no state between calls, so one instance can serve
/// any number of concurrent sagas. Within a run, steps execute strictly one
/// after another. On the first failure every completed step is compensated,
/// most recent first; a failing compensation is logged and the sweep moves
/// on. A step that panics counts as a failed step or a failed
/// compensation. The orchestrator never retries a step and imposes no time
/// limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SagaOrchestrator;

impl SagaOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Builds a definition from `name` and `steps` and executes it, see
    /// [`execute_saga`](Self::execute_saga).
    pub async fn execute_saga_steps(
        &self,
        name: impl Into<String>,
        steps: Vec<BoxedStep>,
    ) -> Result<SagaResult, SagaError> {
        self.execute_saga(SagaDefinition::from_steps(name, steps)).await
    }

    /// Executes every step of `definition` in order.
    ///
    /// Returns `Err` only for a malformed definition, before any step runs.
    /// Step and compensation failures are reported through the returned
    /// [`SagaResult`].
    #[tracing::instrument(
        skip(self, definition),
        fields(saga = %definition.name(), saga_id = tracing::field::Empty)
    )]
    pub async fn execute_saga(&self, mut definition: SagaDefinition) -> Result<SagaResult, SagaError> {
        if let Err(err) = definition.validate() {
            metrics::counter!("saga_rejected_total").increment(1);
            tracing::warn!(error = %err, "saga definition rejected");
            return Err(err);
        }

        let saga_id = SagaId::new();
        tracing::Span::current().record("saga_id", tracing::field::display(saga_id));

        let saga_name = definition.name().to_string();
        let started = Instant::now();
        metrics::counter!("saga_executions_total", "saga" => saga_name.clone()).increment(1);
        tracing::info!(%saga_id, steps = definition.len(), "saga started");

        let mut result = SagaResult::start(saga_id, &saga_name, definition.len());

        // Forward pass: stop at the first failure, remembering its position.
        let mut failed_at = None;
        for (index, step) in definition.steps.iter_mut().enumerate() {
            let step_name = step.name().to_string();
            tracing::info!(step = %step_name, position = index + 1, "saga step started");

            match guarded(step.execute()).await {
                Ok(()) => {
                    tracing::info!(step = %step_name, "saga step completed");
                    result.record_completed(step_name);
                }
                Err(error) => {
                    tracing::warn!(step = %step_name, %error, "saga step failed");
                    result.begin_compensation(step_name, error);
                    failed_at = Some(index);
                    break;
                }
            }
        }

        let result = match failed_at {
            None => {
                let result = result.finish();
                metrics::counter!("saga_completed_total", "saga" => saga_name.clone())
                    .increment(1);
                tracing::info!(%saga_id, "saga completed successfully");
                result
            }
            Some(index) => {
                // Exactly the steps before the failing one completed.
                compensate(&mut definition.steps[..index], &mut result, &saga_name).await;
                let result = result.finish();
                metrics::counter!("saga_failed_total", "saga" => saga_name.clone()).increment(1);
                tracing::warn!(
                    %saga_id,
                    failed_step = result.failed_step().unwrap_or_default(),
                    compensated = result.compensations().len(),
                    manual_intervention = result.needs_manual_intervention(),
                    "saga failed"
                );
                result
            }
        };

        metrics::histogram!("saga_duration_seconds", "saga" => saga_name)
            .record(started.elapsed().as_secs_f64());

        Ok(result)
    }
}

/// Runs a step call, reporting a panic inside it as a step failure.
async fn guarded<F>(call: F) -> Result<(), StepError>
where
    F: Future<Output = Result<(), StepError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(StepError::new(format!(
            "step panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Undoes `completed` in reverse order, visiting every step exactly once.
async fn compensate(completed: &mut [Box<dyn BoundStep>], result: &mut SagaResult, saga_name: &str) {
    tracing::info!(steps = completed.len(), "compensation started");

    for step in completed.iter_mut().rev() {
        let step_name = step.name().to_string();
        tracing::info!(step = %step_name, "compensation step started");
        metrics::counter!("saga_compensations_total", "saga" => saga_name.to_string())
            .increment(1);

        let outcome = match guarded(step.compensate()).await {
            Ok(()) => {
                tracing::info!(step = %step_name, "compensation step completed");
                CompensationOutcome::Compensated
            }
            Err(error) => {
                metrics::counter!(
                    "saga_compensation_failures_total",
                    "saga" => saga_name.to_string()
                )
                .increment(1);
                tracing::error!(
                    step = %step_name,
                    %error,
                    manual_intervention = true,
                    "compensation step failed"
                );
                CompensationOutcome::Failed { error }
            }
        };
        result.record_compensation(step_name, outcome);
    }
}
