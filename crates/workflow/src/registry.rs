//! Ordered step registry.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{StepDescriptor, StepId};

/// Ordered collection of step descriptors with an id → index map.
///
/// Built once at startup. Always ends with the `finalize` step.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<StepDescriptor>,
    index: HashMap<StepId, usize>,
    first: StepId,
}

impl StepRegistry {
    /// Build a registry from an ordered list of steps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the list is empty, an id repeats, or the
    /// last step is not `finalize`.
    pub fn register(steps: Vec<StepDescriptor>) -> Result<Self> {
        let last = steps
            .last()
            .ok_or_else(|| Error::config("registry has no steps"))?;
        if !last.is_finalize() {
            return Err(Error::config(format!(
                "last step must be 'finalize', found '{}'",
                last.id
            )));
        }

        let mut index = HashMap::with_capacity(steps.len());
        for (position, step) in steps.iter().enumerate() {
            if step.done_key.is_empty() {
                return Err(Error::config(format!("step '{}' has an empty done key", step.id)));
            }
            if index.insert(step.id.clone(), position).is_some() {
                return Err(Error::config(format!("duplicate step id '{}'", step.id)));
            }
        }

        let first = steps
            .first()
            .map_or_else(StepId::finalize, |s| s.id.clone());

        Ok(Self {
            steps,
            index,
            first,
        })
    }

    /// Registry position of a step.
    pub fn index_of(&self, step_id: &str) -> Result<usize> {
        self.index
            .get(step_id)
            .copied()
            .ok_or_else(|| Error::unknown_step(step_id))
    }

    /// Descriptor of a step.
    pub fn get(&self, step_id: &str) -> Result<&StepDescriptor> {
        let position = self.index_of(step_id)?;
        self.steps
            .get(position)
            .ok_or_else(|| Error::unknown_step(step_id))
    }

    /// Id of the step after `step_id`. The step before `finalize` yields
    /// `finalize`; `finalize` itself has no successor.
    pub fn next_id(&self, step_id: &str) -> Result<StepId> {
        let position = self.index_of(step_id)?;
        self.steps
            .get(position.saturating_add(1))
            .map(|s| s.id.clone())
            .ok_or_else(|| Error::unknown_step(format!("{step_id} (no step follows finalize)")))
    }

    /// Descriptor of the step before `step_id`, if any.
    pub fn previous(&self, step_id: &str) -> Result<Option<&StepDescriptor>> {
        let position = self.index_of(step_id)?;
        Ok(position.checked_sub(1).and_then(|p| self.steps.get(p)))
    }

    /// Id of the first step (`finalize` for a registry with no other steps).
    pub fn first_id(&self) -> &StepId {
        &self.first
    }

    /// All steps in order, finalize included.
    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    /// Steps from `step_id` (inclusive) to the end, finalize excluded.
    pub fn steps_from(&self, step_id: &str) -> Result<impl Iterator<Item = &StepDescriptor>> {
        let position = self.index_of(step_id)?;
        Ok(self
            .steps
            .iter()
            .skip(position)
            .filter(|s| !s.is_finalize()))
    }

    /// Every step except `finalize`, in order.
    pub fn data_steps(&self) -> impl Iterator<Item = &StepDescriptor> {
        self.steps.iter().filter(|s| !s.is_finalize())
    }

    /// Number of steps, finalize included.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false: a registry holds at least `finalize`.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
