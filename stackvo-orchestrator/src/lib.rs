//! Stackvo lifecycle orchestrator.
//!
//! - [`registry`]: units joined with live container state
//! - [`resolver`]: dependency lookup and cycle detection
//! - [`controller`]: enable/disable state machine with rollback
//! - [`build`] / [`jobs`]: project build pipeline run as background jobs
//! - [`cache`]: short-TTL query cache
//! - [`runtime`], [`compose`], [`generator`]: external collaborators
//! - [`orchestrator`]: the facade tying them together

pub mod build;
pub mod cache;
pub mod compose;
pub mod controller;
pub mod error;
pub mod events;
pub mod generator;
pub mod jobs;
pub mod locks;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod runtime;

pub use build::{BuildFailure, BuildResult, BuildStage, StageOutput};
pub use cache::{Clock, ManualClock, RuntimeSummary, SystemClock};
pub use controller::{LifecycleOutcome, StepRecord};
pub use error::{OrchestratorError, RuntimeError};
pub use events::{BroadcastSink, Event, EventSink, RecordingSink, Step, StepStatus};
pub use jobs::{BuildJob, JobStatus, MAX_FINISHED_JOBS};
pub use orchestrator::{Collaborators, Orchestrator};
pub use resolver::{DependencyReport, DependencyState};
