//! Linear step-progression engine.
//!
//! A pipeline walks a user through an ordered sequence of named steps. Each
//! step's answer is persisted under a pipeline id, and every rendered step
//! tells the client which step to fetch next, so the client advances without
//! manual navigation. Key features include:
//!
//! - **Derived view phases**: a step renders as locked, completed or input,
//!   computed fresh from persisted state on every read.
//! - **Chain signals**: locked and completed views point at the next step;
//!   an input view halts the chain.
//! - **Cascade revert**: reverting to a step clears it and every later step.
//! - **Finalize lock**: a pipeline-wide flag that freezes every done step.
//! - **Pluggable storage**: in-memory and directory-backed JSON stores.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stepline_workflow::{
//!     EngineConfig, FormData, HandlerRegistry, InMemoryStore, PipelineEngine,
//!     PipelineId, StepDescriptor, StepRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> stepline_workflow::Result<()> {
//!     let registry = StepRegistry::register(vec![
//!         StepDescriptor::new("name", "name", "Your name"),
//!         StepDescriptor::new("greeting", "greeting", "Greeting")
//!             .with_template("Hello {value}!"),
//!         StepDescriptor::finalize(),
//!     ])?;
//!
//!     let engine = PipelineEngine::new(
//!         Arc::new(registry),
//!         Arc::new(InMemoryStore::new()),
//!         Arc::new(HandlerRegistry::new()),
//!         EngineConfig::default(),
//!     );
//!
//!     let id = PipelineId::parse("hello-01")?;
//!     engine.start(id.as_str()).await?;
//!     let form = FormData::from([("name".to_string(), "Ada".to_string())]);
//!     let reply = engine.submit("name", &id, &form).await?;
//!     println!("next: {:?}", reply.chain());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod controller;
pub mod engine;
pub mod error;
pub mod finalize;
pub mod handler;
pub mod lock;
pub mod registry;
pub mod revert;
pub mod state;
pub mod storage;
pub mod types;
pub mod view;

// Re-export main types
pub use controller::{phase_of, FormData, StepController};
pub use engine::{EngineConfig, PipelineEngine, PipelineSummary};
pub use error::{Error, Result};
pub use finalize::{FinalizeGate, FinalizePolicy};
pub use handler::{FnHandler, HandlerRegistry, PatternHandler, StepHandler, TextHandler};
pub use lock::PipelineLocks;
pub use registry::StepRegistry;
pub use revert::RevertCoordinator;
pub use state::{PipelineState, StepData};
pub use storage::{DirectoryStore, InMemoryStore, PipelineStore, StateRepository};
pub use types::{
    PipelineId, StepDescriptor, StepId, TransformFn, FINALIZE, RESERVED_PIPELINE_IDS,
};
pub use view::{ChainSignal, Phase, Rendered, RouteTarget, StepReply, StepView};
