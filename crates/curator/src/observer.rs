//! Progress notifications for callers that want more than log lines.

use crate::report::WorkflowReport;
use curator_core::{AttemptRecord, StepName, StepOutcome, WorkerName};
use std::fmt::Debug;

/// Receives progress events while a workflow runs.
///
/// Every method has an empty default, implement only what you need.
/// Attempt events are delivered from the sub-task that made the attempt, so
/// implementations must be thread-safe.
///
/// # Examples
///
/// ```
/// use curator::{Observer, StepName};
///
/// #[derive(Debug)]
/// struct Banner;
///
/// impl Observer for Banner {
///     fn step_started(&self, step: &StepName, position: usize, total: usize) {
///         println!("STEP {}/{}: {}", position + 1, total, step);
///     }
/// }
/// ```
pub trait Observer: Send + Sync + Debug {
    fn run_started(&self, _run_id: &str, _steps: &[StepName]) {}

    fn step_started(&self, _step: &StepName, _position: usize, _total: usize) {}

    fn attempt_finished(&self, _step: &StepName, _worker: &WorkerName, _record: &AttemptRecord) {}

    fn step_finished(&self, _outcome: &StepOutcome) {}

    fn run_finished(&self, _report: &WorkflowReport) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl Observer for SilentObserver {}
