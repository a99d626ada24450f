//! Views, chain signals and replies returned to the boundary layer.

use serde::Serialize;
use serde_json::Value;

use crate::types::{PipelineId, StepId};

/// View phase of a data step, derived fresh from pipeline state on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Pipeline finalized and step done: read-only.
    Locked,
    /// Step done and not the revert target: summary plus revert affordance.
    Completed,
    /// Editable form.
    Input,
}

impl Phase {
    /// Whether a view in this phase carries a chain signal.
    pub fn chains(self) -> bool {
        matches!(self, Self::Locked | Self::Completed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Locked => "locked",
            Self::Completed => "completed",
            Self::Input => "input",
        };
        write!(f, "{s}")
    }
}

/// Typed routing target; the boundary turns it into a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RouteTarget {
    pub step_id: StepId,
}

/// Instruction to the client: immediately fetch the target step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChainSignal {
    pub target: RouteTarget,
}

impl ChainSignal {
    /// Chain to `step_id`.
    pub fn to(step_id: StepId) -> Self {
        Self {
            target: RouteTarget { step_id },
        }
    }

    /// Step the client should fetch next.
    pub fn step_id(&self) -> &StepId {
        &self.target.step_id
    }
}

/// Rendered content of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StepView {
    Locked {
        step_id: StepId,
        label: String,
        value: Value,
        summary: String,
    },
    Completed {
        step_id: StepId,
        label: String,
        value: Value,
        summary: String,
    },
    Input {
        step_id: StepId,
        label: String,
        /// Form field the step collects (its done key).
        field: String,
        prefill: Option<String>,
        error: Option<String>,
    },
    /// The terminal step. `missing` lists data steps not yet done.
    Finalize {
        step_id: StepId,
        finalized: bool,
        missing: Vec<StepId>,
    },
}

impl StepView {
    /// Phase of a data-step view; `None` for the finalize terminal.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Locked { .. } => Some(Phase::Locked),
            Self::Completed { .. } => Some(Phase::Completed),
            Self::Input { .. } => Some(Phase::Input),
            Self::Finalize { .. } => None,
        }
    }

    /// Step this view renders.
    pub fn step_id(&self) -> &StepId {
        match self {
            Self::Locked { step_id, .. }
            | Self::Completed { step_id, .. }
            | Self::Input { step_id, .. }
            | Self::Finalize { step_id, .. } => step_id,
        }
    }

    /// Inline validation message, if this is a rejected input view.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Input { error, .. } => error.as_deref(),
            _ => None,
        }
    }
}

/// A view plus the chain signal it emits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    pub view: StepView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainSignal>,
}

impl Rendered {
    /// Pair a view with its chain signal. Only locked and completed views
    /// chain; for any other view `next` is discarded.
    pub fn new(view: StepView, next: Option<StepId>) -> Self {
        let chains = view.phase().is_some_and(Phase::chains);
        let chain = next.filter(|_| chains).map(ChainSignal::to);
        Self { view, chain }
    }

    /// A view that halts the chain.
    pub fn halted(view: StepView) -> Self {
        Self { view, chain: None }
    }
}

/// Reply of an engine operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepReply {
    /// Render one step.
    View(Rendered),
    /// Re-render the pipeline from its first step; the chain carries the
    /// client forward from there.
    Restart {
        pipeline_id: PipelineId,
        chain: ChainSignal,
    },
    /// Discard the session and reload the landing page.
    Refresh,
}

impl StepReply {
    /// The rendered view, if this reply carries one.
    pub fn rendered(&self) -> Option<&Rendered> {
        match self {
            Self::View(rendered) => Some(rendered),
            _ => None,
        }
    }

    /// Chain signal carried by the reply, if any.
    pub fn chain(&self) -> Option<&ChainSignal> {
        match self {
            Self::View(rendered) => rendered.chain.as_ref(),
            Self::Restart { chain, .. } => Some(chain),
            Self::Refresh => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input_view() -> StepView {
        StepView::Input {
            step_id: StepId::new("a"),
            label: "A".into(),
            field: "a_val".into(),
            prefill: None,
            error: None,
        }
    }

    #[test]
    fn test_input_never_chains() {
        let rendered = Rendered::new(input_view(), Some(StepId::new("b")));
        assert!(rendered.chain.is_none());
    }

    #[test]
    fn test_completed_chains() {
        let view = StepView::Completed {
            step_id: StepId::new("a"),
            label: "A".into(),
            value: json!("x"),
            summary: "A: x".into(),
        };
        let rendered = Rendered::new(view, Some(StepId::new("b")));
        assert_eq!(rendered.chain, Some(ChainSignal::to(StepId::new("b"))));
    }

    #[test]
    fn test_view_serializes_with_phase_tag() {
        let value = serde_json::to_value(Rendered::halted(input_view())).ok();
        assert_eq!(value.as_ref().map(|v| v["view"]["phase"].clone()), Some(json!("input")));
        assert!(value.map(|v| v.get("chain").is_none()).unwrap_or(false));
    }
}
