//! Property-based tests for the view state machine.
//!
//! Uses proptest to validate:
//! - Rendering is a pure read
//! - Following chain signals always terminates
//! - Revert clears the target and everything after it

#![allow(clippy::expect_used)]

use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use stepline_workflow::{
    EngineConfig, FinalizePolicy, FormData, HandlerRegistry, InMemoryStore, Phase,
    PipelineEngine, PipelineId, PipelineStore, StepDescriptor, StepRegistry,
};

/// One mutation applied to a pipeline before checking a property.
#[derive(Debug, Clone)]
enum Op {
    Submit(usize, String),
    Blank(usize),
    Revert(usize),
    Finalize,
    Unfinalize,
}

fn op_strategy(steps: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..steps, "[a-z]{1,8}").prop_map(|(i, v)| Op::Submit(i, v)),
        1 => (0..steps).prop_map(Op::Blank),
        2 => (0..steps).prop_map(Op::Revert),
        1 => Just(Op::Finalize),
        1 => Just(Op::Unfinalize),
    ]
}

fn step_id(index: usize) -> String {
    format!("s{index}")
}

fn setup(steps: usize) -> (PipelineEngine, Arc<InMemoryStore>) {
    let mut descriptors: Vec<StepDescriptor> = (0..steps)
        .map(|i| {
            StepDescriptor::new(step_id(i), format!("v{i}"), format!("Step {i}"))
                .with_refill(i % 2 == 0)
        })
        .collect();
    descriptors.push(StepDescriptor::finalize());

    let store = Arc::new(InMemoryStore::new());
    let engine = PipelineEngine::new(
        Arc::new(StepRegistry::register(descriptors).expect("registry")),
        Arc::clone(&store) as Arc<dyn PipelineStore>,
        Arc::new(HandlerRegistry::new()),
        EngineConfig {
            finalize_policy: FinalizePolicy::AllowIncomplete,
            ..EngineConfig::default()
        },
    );
    (engine, store)
}

fn pid() -> PipelineId {
    PipelineId::parse("prop-01").expect("valid id")
}

/// Apply operations, ignoring refusals such as reverting a finalized pipeline.
async fn apply(engine: &PipelineEngine, ops: &[Op]) {
    for op in ops {
        let _ = match op {
            Op::Submit(i, value) => {
                let form = FormData::from([(format!("v{i}"), value.clone())]);
                engine.submit(&step_id(*i), &pid(), &form).await
            }
            Op::Blank(i) => {
                let form = FormData::from([(format!("v{i}"), String::new())]);
                engine.submit(&step_id(*i), &pid(), &form).await
            }
            Op::Revert(i) => engine.revert_to(&step_id(*i), &pid()).await,
            Op::Finalize => engine.finalize(&pid()).await,
            Op::Unfinalize => engine.unfinalize(&pid()).await,
        };
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    /// Property: two renders with no mutation in between are identical
    #[test]
    fn prop_render_is_idempotent(
        steps in 1usize..5,
        ops in prop::collection::vec(op_strategy(4), 0..12),
    ) {
        let ops: Vec<Op> = ops.into_iter().filter(|op| match op {
            Op::Submit(i, _) | Op::Blank(i) | Op::Revert(i) => *i < steps,
            _ => true,
        }).collect();

        runtime().block_on(async {
            let (engine, store) = setup(steps);
            apply(&engine, &ops).await;
            let before = store.load(&pid()).await.expect("load");

            for i in 0..steps {
                let first = engine.render(&step_id(i), &pid()).await.expect("render");
                let second = engine.render(&step_id(i), &pid()).await.expect("render");
                prop_assert_eq!(first, second);
            }
            prop_assert_eq!(store.load(&pid()).await.expect("load"), before);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Property: the chain from the first step halts at an input step or the
    /// finalize terminal within len(registry) hops
    #[test]
    fn prop_chain_terminates(
        ops in prop::collection::vec(op_strategy(4), 0..16),
    ) {
        runtime().block_on(async {
            let (engine, _) = setup(4);
            apply(&engine, &ops).await;

            let walk = engine.walk_chain(&pid()).await.expect("walk");
            prop_assert!(!walk.is_empty());
            prop_assert!(walk.len() <= engine.registry().len());

            let last = walk.last().expect("non-empty walk");
            prop_assert!(last.chain.is_none());
            let halted_on_input = last.view.phase() == Some(Phase::Input);
            prop_assert!(halted_on_input || last.view.step_id().is_finalize());
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Property: after revert_to(S) no step at or after S holds data and S
    /// renders as input
    #[test]
    fn prop_revert_clears_cascade(
        values in prop::collection::vec("[a-z]{1,8}", 4),
        target in 0usize..4,
    ) {
        runtime().block_on(async {
            let (engine, store) = setup(4);
            for (i, value) in values.iter().enumerate() {
                let form = FormData::from([(format!("v{i}"), value.clone())]);
                engine.submit(&step_id(i), &pid(), &form).await.expect("submit");
            }

            engine.revert_to(&step_id(target), &pid()).await.expect("revert");

            let document = store.load(&pid()).await.expect("load").expect("document");
            for i in 0..4 {
                let present = document["steps"].get(step_id(i)).is_some();
                prop_assert_eq!(present, i < target, "step {} presence", i);
            }
            let rendered = engine.render(&step_id(target), &pid()).await.expect("render");
            prop_assert_eq!(rendered.view.phase(), Some(Phase::Input));
            Ok::<(), TestCaseError>(())
        })?;
    }
}
