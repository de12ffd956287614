//! Ordered saga definitions.

use std::collections::HashSet;

use crate::error::SagaError;
use crate::step::{BoundStep, BoxedStep, SagaStep};

/// An ordered list of steps making up one saga.
///
/// Insertion order is execution order, and its reverse is compensation
/// order. A definition is consumed by a single run: each step holds the
/// context its own `execute` produced until the run ends.
pub struct SagaDefinition {
    name: String,
    pub(crate) steps: Vec<Box<dyn BoundStep>>,
}

impl SagaDefinition {
    /// Creates an empty definition. Add steps with [`step`](Self::step).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step, builder style.
    pub fn step<S>(mut self, step: S) -> Self
    where
        S: SagaStep + 'static,
    {
        self.push(step);
        self
    }

    /// Appends a step.
    pub fn push<S>(&mut self, step: S)
    where
        S: SagaStep + 'static,
    {
        self.push_boxed(BoxedStep::new(step));
    }

    /// Appends an already type-erased step.
    pub fn push_boxed(&mut self, step: BoxedStep) {
        self.steps.push(step.0);
    }

    /// Creates a definition from a list of type-erased steps, in order.
    pub fn from_steps(name: impl Into<String>, steps: Vec<BoxedStep>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into_iter().map(|step| step.0).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the step names in execution order.
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    /// Checks that the definition is non-empty and that step names are
    /// non-empty and unique.
    pub fn validate(&self) -> Result<(), SagaError> {
        if self.steps.is_empty() {
            return Err(SagaError::EmptyDefinition {
                saga: self.name.clone(),
            });
        }

        let mut seen = HashSet::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let name = step.name();
            if name.trim().is_empty() {
                return Err(SagaError::EmptyStepName {
                    saga: self.name.clone(),
                    position: index + 1,
                });
            }
            if !seen.insert(name) {
                return Err(SagaError::DuplicateStepName {
                    saga: self.name.clone(),
                    step: name.to_string(),
                });
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for SagaDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDefinition")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::step_without_compensation;

    fn noop(name: &'static str) -> impl SagaStep + 'static {
        step_without_compensation(name, || async { Ok(()) })
    }

    #[test]
    fn from_steps_keeps_order_and_validates() {
        let def = SagaDefinition::from_steps(
            "PayBill",
            vec![BoxedStep::new(noop("verify_bill")), BoxedStep::new(noop("verify_bill"))],
        );

        assert_eq!(def.step_names(), ["verify_bill", "verify_bill"]);
        assert!(matches!(
            def.validate(),
            Err(SagaError::DuplicateStepName { step, .. }) if step == "verify_bill"
        ));
    }

    #[test]
    fn preserves_insertion_order() {
        let def = SagaDefinition::new("PayBill")
            .step(noop("verify_bill"))
            .step(noop("create_payment_record"))
            .step(noop("process_payment"));

        assert_eq!(def.len(), 3);
        assert_eq!(
            def.step_names(),
            vec!["verify_bill", "create_payment_record", "process_payment"]
        );
        assert!(def.validate().is_ok());
    }

    #[test]
    fn empty_definition_is_rejected() {
        let def = SagaDefinition::new("PayBill");
        assert!(def.is_empty());
        assert!(matches!(
            def.validate(),
            Err(SagaError::EmptyDefinition { saga }) if saga == "PayBill"
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let def = SagaDefinition::new("PayBill")
            .step(noop("verify_bill"))
            .step(noop("process_payment"))
            .step(noop("verify_bill"));

        assert!(matches!(
            def.validate(),
            Err(SagaError::DuplicateStepName { step, .. }) if step == "verify_bill"
        ));
    }

    #[test]
    fn blank_names_are_rejected() {
        let mut def = SagaDefinition::new("PayBill");
        def.push(noop("verify_bill"));
        def.push(noop("  "));

        assert!(matches!(
            def.validate(),
            Err(SagaError::EmptyStepName { position: 2, .. })
        ));
    }

    #[test]
    fn debug_lists_step_names() {
        let def = SagaDefinition::new("PayBill").step(noop("verify_bill"));
        let rendered = format!("{def:?}");
        assert!(rendered.contains("PayBill"));
        assert!(rendered.contains("verify_bill"));
    }
}
