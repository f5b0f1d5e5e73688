//! Core traits and types for the curator pipeline orchestrator.
//!
//! This crate provides minimal abstractions without runtime dependencies.
//! Worker authors should depend on this crate to implement custom workers.
//!
//! # Core Types
//!
//! - [`Worker`] - The capability every pipeline worker implements
//! - [`Context`] - Read-only heterogeneous configuration shared by workers
//! - [`Payload`] / [`Artifacts`] - Data produced by workers
//! - [`StepResult`] / [`StepOutcome`] - Results of invocations and steps
//! - [`RetryPolicy`] / [`FailurePolicy`] / [`InputRequirement`] - Per-step policies
//! - [`StepError`] / [`WorkflowError`] - Error types
//!
//! # Seams
//!
//! - [`Sleeper`] - Backoff waiting, replaceable in tests

mod context;
mod error;
mod outcome;
mod payload;
mod step;
mod traits;

pub use context::{Context, ContextBuilder, ContextKey, WorkerInput};
pub use error::{ErrorKind, StepError, WorkflowError};
pub use outcome::{AttemptRecord, ResultStatus, StepOutcome, StepResult, StepStatus, SubtaskOutcome};
pub use payload::{Artifacts, Payload};
pub use step::{
    FailurePolicy, InputRequirement, RetryPolicy, RetryPolicyError, StepName, WorkerName,
};
pub use traits::{FnWorker, Sleeper, Worker};
