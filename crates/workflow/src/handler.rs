//! Step handler trait and implementations.
//!
//! The three-phase decision, cascade clear, and chain emission are shared;
//! what varies per step (how raw input is validated and normalised, how a
//! stored value is summarised) lives behind [`StepHandler`].

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{display_value, StepDescriptor};

/// Trait for per-step input strategies.
pub trait StepHandler: Send + Sync {
    /// Turn non-blank raw input into the value stored under the step's done
    /// key, or an inline validation message.
    ///
    /// # Arguments
    /// * `step` - The step being submitted
    /// * `raw` - The trimmed, non-empty form value
    fn parse(&self, step: &StepDescriptor, raw: &str) -> std::result::Result<Value, String>;

    /// Read-only summary of a stored value for the completed and locked views.
    fn summarize(&self, step: &StepDescriptor, value: &Value) -> String {
        format!("{}: {}", step.label, display_value(value))
    }

    /// Get the handler name (for logging/debugging).
    fn name(&self) -> &str;
}

/// Registry of step handlers keyed by step id.
///
/// Steps without a registered handler use [`TextHandler`].
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
    fallback: Arc<dyn StepHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(TextHandler),
        }
    }
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a step id.
    pub fn register(&mut self, step_id: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(step_id.into(), handler);
    }

    /// Handler for a step id, falling back to [`TextHandler`].
    pub fn get(&self, step_id: &str) -> Arc<dyn StepHandler> {
        self.handlers
            .get(step_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Check if a dedicated handler exists for the step id.
    pub fn has(&self, step_id: &str) -> bool {
        self.handlers.contains_key(step_id)
    }

    /// Get the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Stores the trimmed input as a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

impl StepHandler for TextHandler {
    fn parse(&self, _step: &StepDescriptor, raw: &str) -> std::result::Result<Value, String> {
        Ok(Value::String(raw.to_string()))
    }

    fn name(&self) -> &str {
        "text"
    }
}

/// Accepts input matching a regular expression.
#[derive(Debug, Clone)]
pub struct PatternHandler {
    pattern: Regex,
    message: String,
}

impl PatternHandler {
    /// Compile `pattern`. `message` is shown when input does not match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern does not compile.
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::config(format!("invalid pattern '{pattern}': {e}")))?;
        Ok(Self {
            pattern,
            message: message.into(),
        })
    }
}

impl StepHandler for PatternHandler {
    fn parse(&self, _step: &StepDescriptor, raw: &str) -> std::result::Result<Value, String> {
        if self.pattern.is_match(raw) {
            Ok(Value::String(raw.to_string()))
        } else {
            Err(self.message.clone())
        }
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

/// A handler built from a closure.
pub struct FnHandler<F>
where
    F: Fn(&StepDescriptor, &str) -> std::result::Result<Value, String> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&StepDescriptor, &str) -> std::result::Result<Value, String> + Send + Sync,
{
    /// Create a new function handler.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> StepHandler for FnHandler<F>
where
    F: Fn(&StepDescriptor, &str) -> std::result::Result<Value, String> + Send + Sync,
{
    fn parse(&self, step: &StepDescriptor, raw: &str) -> std::result::Result<Value, String> {
        (self.func)(step, raw)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
