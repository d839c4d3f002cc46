//! Multi-stage, queue-driven worker pipeline.
//!
//! A pipeline is an ordered list of stages. Each stage has its own queue,
//! active-item counter and worker pool; a stage's delegate turns one item
//! into zero or more items for downstream stages. Runs end by themselves
//! once every stage is exhausted and nothing upstream can feed it again.
//!
//! The pieces:
//! - `state.rs`: per-stage queues and counters (`PipelineState`)
//! - `guard.rs`: the run-scoped fatal guard
//! - `stage.rs`: delegate trait and stage configuration
//! - `worker.rs`: the worker loop and termination check
//! - `coordinator.rs`: seeding, launch and join (`Pipeline`)
//! - `events.rs`: optional progress events

mod coordinator;
mod error;
mod events;
mod guard;
mod stage;
mod state;
mod worker;

pub use coordinator::{
    EngineOptions, Pipeline, PipelineReport, StageReport, DEFAULT_MAX_WORKERS_PER_STAGE,
    DEFAULT_QUEUE_WARN_DEPTH,
};
pub use error::{DelegateError, PipelineError};
pub use events::PipelineEvent;
pub use guard::{FatalGuard, GuardState};
pub use stage::{Routed, StageConfig, StageDelegate};
pub use state::{PipelineState, StageQueue, StageSnapshot};
