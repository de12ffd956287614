//! The step contract and its closure-backed implementation.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{Ready, ready};

use crate::error::StepError;

/// A named unit of work with a forward action and a compensating action.
///
/// `execute` returns the step's [`Context`](SagaStep::Context): whatever the
/// step needs later to undo itself, such as the identifier of a record it
/// created. The orchestrator keeps that value privately and moves it into
/// `compensate` if a later step fails, so:
///
/// - `compensate` is called at most once per run;
/// - `compensate` is only called after `execute` returned `Ok`;
/// - no other step can observe the context.
///
/// Implementations own their concurrency control and time limits on the
/// external resources they touch. The orchestrator does neither, see
/// [`with_timeout`].
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// State captured by `execute` and consumed by `compensate`.
    type Context: Send + 'static;

    /// Name of the step, unique within its definition.
    fn name(&self) -> &str;

    /// Runs the forward action.
    async fn execute(&self) -> Result<Self::Context, StepError>;

    /// Restores the external resource to a state equivalent to this step
    /// never having run.
    async fn compensate(&self, context: Self::Context) -> Result<(), StepError>;
}

/// A [`SagaStep`] assembled from two closures.
///
/// Built with [`step`] or [`step_without_compensation`].
pub struct FnStep<C, E, K> {
    name: String,
    execute: E,
    compensate: K,
    _context: PhantomData<fn() -> C>,
}

impl<C, E, K> std::fmt::Debug for FnStep<C, E, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

/// Builds a step from an execute closure and a compensate closure.
///
/// ```
/// use saga::{StepError, step};
///
/// let reserve = step(
///     "reserve_seat",
///     || async { Ok::<_, StepError>(42_u32) },
///     |seat: u32| async move {
///         println!("releasing seat {seat}");
///         Ok(())
///     },
/// );
/// # let _ = reserve;
/// ```
pub fn step<C, E, EFut, K, KFut>(name: impl Into<String>, execute: E, compensate: K) -> FnStep<C, E, K>
where
    C: Send + 'static,
    E: Fn() -> EFut + Send + Sync,
    EFut: Future<Output = Result<C, StepError>> + Send,
    K: Fn(C) -> KFut + Send + Sync,
    KFut: Future<Output = Result<(), StepError>> + Send,
{
    FnStep {
        name: name.into(),
        execute,
        compensate,
        _context: PhantomData,
    }
}

/// Signature of the no-op compensation used by read-only steps.
pub type NoCompensation<C> = fn(C) -> Ready<Result<(), StepError>>;

fn no_compensation<C>(_context: C) -> Ready<Result<(), StepError>> {
    ready(Ok(()))
}

/// Builds a step whose compensation does nothing, for read-only checks.
pub fn step_without_compensation<C, E, EFut>(
    name: impl Into<String>,
    execute: E,
) -> FnStep<C, E, NoCompensation<C>>
where
    C: Send + 'static,
    E: Fn() -> EFut + Send + Sync,
    EFut: Future<Output = Result<C, StepError>> + Send,
{
    step(name, execute, no_compensation::<C> as NoCompensation<C>)
}

#[async_trait]
impl<C, E, EFut, K, KFut> SagaStep for FnStep<C, E, K>
where
    C: Send + 'static,
    E: Fn() -> EFut + Send + Sync,
    EFut: Future<Output = Result<C, StepError>> + Send,
    K: Fn(C) -> KFut + Send + Sync,
    KFut: Future<Output = Result<(), StepError>> + Send,
{
    type Context = C;

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<C, StepError> {
        (self.execute)().await
    }

    async fn compensate(&self, context: C) -> Result<(), StepError> {
        (self.compensate)(context).await
    }
}

/// Runs `future` with a time limit, mapping elapse to a step failure.
///
/// A step that hangs would block its saga forever, so steps wrap each
/// external call with this and let the orchestrator treat the timeout like
/// any other failure.
pub async fn with_timeout<T, F>(step: &str, limit: Duration, future: F) -> Result<T, StepError>
where
    F: Future<Output = Result<T, StepError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(step, limit_ms = limit.as_millis() as u64, "step call timed out");
            Err(StepError::timed_out(step, limit))
        }
    }
}

/// Object-safe view of a step bound to the context it produced.
#[async_trait]
pub(crate) trait BoundStep: Send {
    fn name(&self) -> &str;

    async fn execute(&mut self) -> Result<(), StepError>;

    async fn compensate(&mut self) -> Result<(), StepError>;
}

pub(crate) struct Bound<S: SagaStep> {
    step: S,
    context: Option<S::Context>,
}

impl<S: SagaStep> Bound<S> {
    pub(crate) fn new(step: S) -> Self {
        Self {
            step,
            context: None,
        }
    }
}

#[async_trait]
impl<S: SagaStep> BoundStep for Bound<S> {
    fn name(&self) -> &str {
        self.step.name()
    }

    async fn execute(&mut self) -> Result<(), StepError> {
        let context = self.step.execute().await?;
        self.context = Some(context);
        Ok(())
    }

    async fn compensate(&mut self) -> Result<(), StepError> {
        match self.context.take() {
            Some(context) => self.step.compensate(context).await,
            None => Err(StepError::new(format!(
                "step '{}' has no completed execution to compensate",
                self.step.name()
            ))),
        }
    }
}

/// A step with its context type erased.
///
/// Lets callers build a step list from different step types, see
/// [`SagaOrchestrator::execute_saga_steps`](crate::SagaOrchestrator::execute_saga_steps).
pub struct BoxedStep(pub(crate) Box<dyn BoundStep>);

impl BoxedStep {
    pub fn new<S: SagaStep + 'static>(step: S) -> Self {
        Self(Box::new(Bound::new(step)))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl std::fmt::Debug for BoxedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoxedStep").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn fn_step_passes_context_to_compensate() {
        let undone = Arc::new(AtomicU32::new(0));
        let seen = undone.clone();
        let s = step(
            "create_record",
            || async { Ok(7_u32) },
            move |id: u32| {
                let seen = seen.clone();
                async move {
                    seen.store(id, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        let context = s.execute().await.unwrap();
        s.compensate(context).await.unwrap();
        assert_eq!(undone.load(Ordering::SeqCst), 7);
        assert_eq!(s.name(), "create_record");
    }

    #[tokio::test]
    async fn bound_step_compensates_only_once() {
        let mut bound = Bound::new(step_without_compensation("verify", || async { Ok(()) }));
        bound.execute().await.unwrap();
        assert!(bound.compensate().await.is_ok());
        assert!(bound.compensate().await.is_err());
    }

    #[tokio::test]
    async fn bound_step_refuses_compensation_before_execute() {
        let mut bound = Bound::new(step_without_compensation("verify", || async { Ok(()) }));
        let err = bound.compensate().await.unwrap_err();
        assert!(err.message().contains("verify"));
    }

    #[tokio::test]
    async fn failed_execute_leaves_nothing_to_compensate() {
        let mut bound = Bound::new(step_without_compensation("verify", || async {
            Err::<(), _>(StepError::new("bill not found"))
        }));
        assert!(bound.execute().await.is_err());
        assert!(bound.compensate().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_maps_elapse_to_step_error() {
        let result: Result<(), StepError> = with_timeout(
            "notify",
            Duration::from_millis(50),
            std::future::pending(),
        )
        .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "step 'notify' timed out after 50ms"
        );
    }

    #[tokio::test]
    async fn with_timeout_passes_through_inner_result() {
        let ok = with_timeout("notify", Duration::from_secs(1), async { Ok::<_, StepError>(3) }).await;
        assert_eq!(ok.unwrap(), 3);

        let err = with_timeout("notify", Duration::from_secs(1), async {
            Err::<u8, _>(StepError::new("smtp down"))
        })
        .await;
        assert_eq!(err.unwrap_err().message(), "smtp down");
    }
}
