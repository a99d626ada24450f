//! Typed pipeline state document.
//!
//! Persisted layout:
//!
//! ```text
//! {
//!   "steps": { "<stepId>": { "<doneKey>": <value>, ... }, ... },
//!   "finalize": { "finalized": true|false },
//!   "_revert_target": "<stepId>" | absent,
//!   "_refill": { "<stepId>": <value> } | absent,
//!   "created": "<rfc3339>",
//!   "updated": "<rfc3339>"
//! }
//! ```
//!
//! `steps.finalize.finalized` mirrors the top-level flag on every write.
//! Unknown top-level keys and extra keys inside a step's data are carried
//! through untouched. Timestamps without an offset are read as UTC, and a
//! timestamp that does not parse at all is kept verbatim.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;
use crate::registry::StepRegistry;
use crate::types::{is_non_empty, StepDescriptor, StepId, FINALIZE, FINALIZED_KEY};

/// Per-step key/value document written by that step's submit.
pub type StepData = Map<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FinalizeFlag {
    #[serde(default)]
    finalized: bool,
}

/// A stored `created`/`updated` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum Stamp {
    At(DateTime<Utc>),
    Naive(NaiveDateTime),
    Raw(Value),
}

impl Stamp {
    fn now() -> Self {
        Self::At(Utc::now())
    }

    fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(at) => Some(*at),
            Self::Naive(naive) => Some(naive.and_utc()),
            Self::Raw(_) => None,
        }
    }
}

/// State of one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    #[serde(default)]
    steps: BTreeMap<StepId, StepData>,
    #[serde(default)]
    finalize: FinalizeFlag,
    #[serde(rename = "_revert_target", default, skip_serializing_if = "Option::is_none")]
    revert_target: Option<StepId>,
    #[serde(rename = "_refill", default, skip_serializing_if = "BTreeMap::is_empty")]
    refill: BTreeMap<StepId, Value>,
    #[serde(default = "Stamp::now")]
    created: Stamp,
    #[serde(default = "Stamp::now")]
    updated: Stamp,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    /// Fresh state: no steps, not finalized.
    pub fn new() -> Self {
        let now = Stamp::now();
        Self {
            steps: BTreeMap::new(),
            finalize: FinalizeFlag::default(),
            revert_target: None,
            refill: BTreeMap::new(),
            created: now.clone(),
            updated: now,
            extra: Map::new(),
        }
    }

    /// Decode a stored document and normalise it against `registry`.
    ///
    /// A `steps.finalize.finalized` mirror is folded into the top-level flag,
    /// and a revert target naming an unknown step is dropped.
    pub fn from_document(document: Value, registry: &StepRegistry) -> Result<Self> {
        let mut state: Self = serde_json::from_value(document)?;

        if let Some(mirror) = state.steps.remove(FINALIZE) {
            let flagged = mirror
                .get(FINALIZED_KEY)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            state.finalize.finalized |= flagged;
        }

        if let Some(target) = state.revert_target.take() {
            if registry.index_of(target.as_str()).is_ok() && !target.is_finalize() {
                state.revert_target = Some(target);
            } else {
                warn!(revert_target = %target, "Dropping revert target for unknown step");
            }
        }

        Ok(state)
    }

    /// Encode as a store document, writing the `steps.finalize` mirror.
    pub fn to_document(&self) -> Result<Value> {
        let mut document = serde_json::to_value(self)?;
        if let Some(steps) = document.get_mut("steps").and_then(Value::as_object_mut) {
            let mut mirror = Map::new();
            mirror.insert(FINALIZED_KEY.to_string(), Value::Bool(self.is_finalized()));
            steps.insert(FINALIZE.to_string(), Value::Object(mirror));
        }
        Ok(document)
    }

    /// Whether the finalize gate is engaged.
    pub fn is_finalized(&self) -> bool {
        self.finalize.finalized
    }

    /// Engage or release the finalize gate.
    pub fn set_finalized(&mut self, finalized: bool) {
        self.finalize.finalized = finalized;
        self.touch();
    }

    /// Step the user explicitly asked to revisit.
    pub fn revert_target(&self) -> Option<&StepId> {
        self.revert_target.as_ref()
    }

    /// Mark `step_id` as the active revert target.
    pub fn set_revert_target(&mut self, step_id: StepId) {
        self.revert_target = Some(step_id);
        self.touch();
    }

    /// Whether `step_id` is the active revert target.
    pub fn is_revert_target(&self, step_id: &StepId) -> bool {
        self.revert_target.as_ref() == Some(step_id)
    }

    /// Data written by a step, if any.
    pub fn step_data(&self, step_id: &str) -> Option<&StepData> {
        self.steps.get(step_id)
    }

    /// The step's done value, if present and non-empty.
    pub fn done_value(&self, step: &StepDescriptor) -> Option<&Value> {
        self.steps
            .get(step.id.as_str())
            .and_then(|data| data.get(&step.done_key))
            .filter(|value| is_non_empty(value))
    }

    /// Whether a step is done. The finalize step is done exactly when the
    /// pipeline is finalized.
    pub fn is_done(&self, step: &StepDescriptor) -> bool {
        if step.is_finalize() {
            return self.is_finalized();
        }
        self.done_value(step).is_some()
    }

    /// Record a step's done value, clearing the revert target if it names
    /// this step.
    pub fn record(&mut self, step: &StepDescriptor, value: Value) {
        self.steps
            .entry(step.id.clone())
            .or_default()
            .insert(step.done_key.clone(), value);
        if self.is_revert_target(&step.id) {
            self.revert_target = None;
        }
        self.touch();
    }

    /// Remove a step's data, returning what was stored.
    pub fn clear_step(&mut self, step_id: &str) -> Option<StepData> {
        let removed = self.steps.remove(step_id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Keep a cleared value so a refill step can pre-populate its input.
    pub fn remember(&mut self, step_id: StepId, value: Value) {
        self.refill.insert(step_id, value);
    }

    /// Last value remembered for a refill step.
    pub fn remembered(&self, step_id: &str) -> Option<&Value> {
        self.refill.get(step_id)
    }

    /// Ids of steps that hold any data, in key order.
    pub fn stored_steps(&self) -> impl Iterator<Item = &StepId> {
        self.steps.keys()
    }

    /// Non-finalize steps that are not done, in registry order.
    pub fn missing_steps(&self, registry: &StepRegistry) -> Vec<StepId> {
        registry
            .data_steps()
            .filter(|step| !self.is_done(step))
            .map(|step| step.id.clone())
            .collect()
    }

    /// Creation time, if the stored stamp is readable.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.instant()
    }

    /// Time of the last mutation, if the stored stamp is readable.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated.instant()
    }

    fn touch(&mut self) {
        self.updated = Stamp::now();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn registry() -> StepRegistry {
        StepRegistry::register(vec![
            StepDescriptor::new("a", "a_val", "A"),
            StepDescriptor::new("b", "b_val", "B"),
            StepDescriptor::finalize(),
        ])
        .expect("valid registry")
    }

    #[test]
    fn test_document_layout() {
        let reg = registry();
        let mut state = PipelineState::new();
        let a = reg.get("a").expect("a").clone();
        state.record(&a, json!("x"));
        state.set_revert_target(StepId::new("b"));

        let doc = state.to_document().expect("encode");
        assert_eq!(doc["steps"]["a"]["a_val"], json!("x"));
        assert_eq!(doc["finalize"]["finalized"], json!(false));
        assert_eq!(doc["steps"]["finalize"]["finalized"], json!(false));
        assert_eq!(doc["_revert_target"], json!("b"));
        assert!(doc.get("_refill").is_none());
    }

    #[test]
    fn test_round_trip_keeps_opaque_keys() {
        let reg = registry();
        let doc = json!({
            "steps": { "a": { "a_val": "x", "notes": [1, 2] } },
            "finalize": { "finalized": false },
            "owner": "ada"
        });
        let state = PipelineState::from_document(doc, &reg).expect("decode");
        let back = state.to_document().expect("encode");
        assert_eq!(back["steps"]["a"]["notes"], json!([1, 2]));
        assert_eq!(back["owner"], json!("ada"));
    }

    #[test]
    fn test_legacy_finalize_mirror_is_folded() {
        let reg = registry();
        let doc = json!({ "steps": { "finalize": { "finalized": true } } });
        let state = PipelineState::from_document(doc, &reg).expect("decode");
        assert!(state.is_finalized());
        assert!(state.step_data(FINALIZE).is_none());
    }

    #[test]
    fn test_unknown_revert_target_dropped() {
        let reg = registry();
        let doc = json!({ "steps": {}, "_revert_target": "nope" });
        let state = PipelineState::from_document(doc, &reg).expect("decode");
        assert!(state.revert_target().is_none());
    }

    #[test]
    fn test_record_clears_matching_revert_target() {
        let reg = registry();
        let a = reg.get("a").expect("a").clone();
        let mut state = PipelineState::new();
        state.set_revert_target(StepId::new("a"));
        state.record(&a, json!("x"));
        assert!(state.revert_target().is_none());
        assert!(state.is_done(&a));
    }

    #[test]
    fn test_empty_value_is_not_done() {
        let reg = registry();
        let a = reg.get("a").expect("a").clone();
        let mut state = PipelineState::new();
        state.record(&a, json!(""));
        assert!(!state.is_done(&a));
        assert_eq!(state.missing_steps(&reg), vec![StepId::new("a"), StepId::new("b")]);
    }

    #[test]
    fn test_finalize_mirror_follows_flag() {
        let reg = registry();
        let mut state = PipelineState::new();
        state.set_finalized(true);
        let doc = state.to_document().expect("encode");
        assert_eq!(doc["finalize"]["finalized"], json!(true));
        assert_eq!(doc["steps"]["finalize"]["finalized"], json!(true));

        let mut reloaded = PipelineState::from_document(doc, &reg).expect("decode");
        assert!(reloaded.is_finalized());
        assert!(reloaded.step_data(FINALIZE).is_none());

        reloaded.set_finalized(false);
        let doc = reloaded.to_document().expect("encode");
        assert_eq!(doc["steps"]["finalize"]["finalized"], json!(false));
    }

    #[test]
    fn test_naive_timestamp_is_read_as_utc() {
        let reg = registry();
        let doc = json!({
            "steps": { "a": { "a_val": "x" } },
            "created": "2024-05-01T10:00:00.123456"
        });
        let state = PipelineState::from_document(doc, &reg).expect("decode");
        let created = state.created_at().expect("readable stamp");
        assert_eq!(created.to_rfc3339(), "2024-05-01T10:00:00.123456+00:00");

        let back = state.to_document().expect("encode");
        assert_eq!(back["created"], json!("2024-05-01T10:00:00.123456"));
    }

    #[test]
    fn test_unreadable_timestamp_is_kept_verbatim() {
        let reg = registry();
        let doc = json!({
            "steps": {},
            "created": "last tuesday",
            "updated": 17
        });
        let mut state = PipelineState::from_document(doc, &reg).expect("decode");
        assert!(state.created_at().is_none());
        assert!(state.updated_at().is_none());

        let a = reg.get("a").expect("a").clone();
        state.record(&a, json!("x"));
        assert!(state.updated_at().is_some());
        let back = state.to_document().expect("encode");
        assert_eq!(back["created"], json!("last tuesday"));
    }
}
