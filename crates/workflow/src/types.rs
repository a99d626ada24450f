//! Core types for the step-progression engine.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Id of the terminal step every registry must end with.
pub const FINALIZE: &str = "finalize";

/// Field the finalize step records its flag under.
pub const FINALIZED_KEY: &str = "finalized";

/// Longest accepted pipeline id.
pub const MAX_PIPELINE_ID_LEN: usize = 128;

/// Ids taken by the static `/{app}/init` and `/{app}/pipelines` routes.
pub const RESERVED_PIPELINE_IDS: [&str; 2] = ["init", "pipelines"];

/// Identifier of a step, stable for the lifetime of a pipeline's data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Create a step id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id of the terminal finalize step.
    pub fn finalize() -> Self {
        Self(FINALIZE.to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the terminal finalize step.
    pub fn is_finalize(&self) -> bool {
        self.0 == FINALIZE
    }
}

impl Borrow<str> for StepId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of one run of the step sequence.
///
/// Used verbatim as a storage key, so only `[A-Za-z0-9._-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PipelineId(String);

impl PipelineId {
    /// Parse and validate a pipeline id. Surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(Error::invalid_pipeline_id(raw, "must not be empty"));
        }
        if id.len() > MAX_PIPELINE_ID_LEN {
            return Err(Error::invalid_pipeline_id(
                raw,
                format!("longer than {MAX_PIPELINE_ID_LEN} characters"),
            ));
        }
        if id.starts_with('.') {
            return Err(Error::invalid_pipeline_id(raw, "must not start with '.'"));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(Error::invalid_pipeline_id(
                raw,
                format!("character '{bad}' is not allowed"),
            ));
        }
        Ok(Self(id.to_string()))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PipelineId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PipelineId> for String {
    fn from(id: PipelineId) -> Self {
        id.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pure function from the previous step's stored value to a suggested value
/// for this step.
pub type TransformFn = dyn Fn(&Value) -> Value + Send + Sync;

/// Immutable definition of one step.
#[derive(Clone)]
pub struct StepDescriptor {
    /// Unique step id.
    pub id: StepId,
    /// Field of this step's stored data that marks it done.
    pub done_key: String,
    /// Display name.
    pub label: String,
    /// Whether the input phase is pre-populated with the previous value.
    pub refill: bool,
    /// Suggested value derived from the previous step's value.
    pub transform: Option<Arc<TransformFn>>,
}

impl StepDescriptor {
    /// Create a step with `refill` off and no transform.
    pub fn new(id: impl Into<String>, done_key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: StepId::new(id),
            done_key: done_key.into(),
            label: label.into(),
            refill: false,
            transform: None,
        }
    }

    /// The terminal finalize step.
    pub fn finalize() -> Self {
        Self::new(FINALIZE, FINALIZED_KEY, "Finalize")
    }

    /// Set the refill policy.
    #[must_use]
    pub fn with_refill(mut self, refill: bool) -> Self {
        self.refill = refill;
        self
    }

    /// Set the transform applied to the previous step's value.
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Set a transform that substitutes the previous value into `template`
    /// at every `{value}` placeholder.
    #[must_use]
    pub fn with_template(self, template: impl Into<String>) -> Self {
        let template = template.into();
        self.with_transform(move |previous| {
            Value::String(template.replace("{value}", &display_value(previous)))
        })
    }

    /// Whether this is the terminal finalize step.
    pub fn is_finalize(&self) -> bool {
        self.id.is_finalize()
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("id", &self.id)
            .field("done_key", &self.done_key)
            .field("label", &self.label)
            .field("refill", &self.refill)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Whether a stored value counts as present for the "done" test.
pub fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Plain-text rendering of a stored value: strings unquoted, anything else
/// as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
