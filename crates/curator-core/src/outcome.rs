//! Results of worker invocations and steps.

use crate::error::StepError;
use crate::payload::Payload;
use crate::step::{FailurePolicy, StepName, WorkerName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Status of a single worker invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

/// What one worker invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Whether the call succeeded.
    pub status: ResultStatus,
    /// Artifact data, present on success.
    pub payload: Option<Payload>,
    /// Failure detail, present on error.
    pub error: Option<StepError>,
    /// Wall time of the call.
    pub duration: Duration,
}

impl StepResult {
    pub fn ok(payload: Payload, duration: Duration) -> Self {
        Self {
            status: ResultStatus::Ok,
            payload: Some(payload),
            error: None,
            duration,
        }
    }

    pub fn error(error: StepError, duration: Duration) -> Self {
        Self {
            status: ResultStatus::Error,
            payload: None,
            error: Some(error),
            duration,
        }
    }

    /// Wraps what a worker returned.
    pub fn from_result(result: Result<Payload, StepError>, duration: Duration) -> Self {
        match result {
            Ok(payload) => Self::ok(payload, duration),
            Err(error) => Self::error(error, duration),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }
}

/// Diagnostic record of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub result: StepResult,
    /// Backoff applied after this attempt, if another attempt followed.
    pub delay: Option<Duration>,
}

/// Final verdict for one worker invocation after retries.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtaskOutcome {
    pub worker: WorkerName,
    /// Last result; its duration spans every attempt and backoff.
    pub result: StepResult,
    pub attempts: Vec<AttemptRecord>,
}

impl SubtaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Final status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Never executed because its input requirement was unmet.
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// The executor's verdict for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step: StepName,
    /// 0-based position in the declared pipeline.
    pub position: usize,
    pub policy: FailurePolicy,
    pub status: StepStatus,
    /// Attempts made; for parallel steps the highest count of any sub-task.
    pub attempts: u32,
    /// Configured attempt limit, kept for reporting.
    pub max_attempts: u32,
    /// Per sub-task results in declaration order.
    pub subtasks: Vec<SubtaskOutcome>,
    /// Union of the payloads of every successful sub-task.
    pub payload: Payload,
    pub error: Option<StepError>,
    pub elapsed: Duration,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }

    /// Names of the sub-tasks that did not succeed.
    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerName> {
        self.subtasks
            .iter()
            .filter(|s| !s.succeeded())
            .map(|s| &s.worker)
    }

    /// Every attempt of every sub-task.
    pub fn attempt_records(&self) -> impl Iterator<Item = (&WorkerName, &AttemptRecord)> {
        self.subtasks
            .iter()
            .flat_map(|s| s.attempts.iter().map(move |a| (&s.worker, a)))
    }

    /// Whether this outcome stops the run.
    pub fn aborts_workflow(&self) -> bool {
        !self.succeeded() && self.policy == FailurePolicy::AbortWorkflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtask(name: &str, result: StepResult) -> SubtaskOutcome {
        SubtaskOutcome {
            worker: WorkerName::new(name),
            attempts: vec![AttemptRecord {
                attempt: 1,
                result: result.clone(),
                delay: None,
            }],
            result,
        }
    }

    #[test]
    fn test_step_result_from_result() {
        let ok = StepResult::from_result(Ok(Payload::new().with("k", 1)), Duration::ZERO);
        assert!(ok.is_ok());
        assert!(ok.error.is_none());

        let err = StepResult::from_result(Err(StepError::fatal("bad key")), Duration::ZERO);
        assert_eq!(err.status, ResultStatus::Error);
        assert!(err.payload.is_none());
    }

    #[test]
    fn test_outcome_helpers() {
        let outcome = StepOutcome {
            step: StepName::new("social"),
            position: 1,
            policy: FailurePolicy::AbortWorkflow,
            status: StepStatus::Failed,
            attempts: 1,
            max_attempts: 3,
            subtasks: vec![
                subtask("x", StepResult::ok(Payload::new(), Duration::ZERO)),
                subtask("linkedin", StepResult::error(StepError::fatal("nope"), Duration::ZERO)),
            ],
            payload: Payload::new(),
            error: None,
            elapsed: Duration::ZERO,
        };

        let failed: Vec<&str> = outcome.failed_workers().map(|w| w.as_str()).collect();
        assert_eq!(failed, vec!["linkedin"]);
        assert_eq!(outcome.attempt_records().count(), 2);
        assert!(outcome.aborts_workflow());
        assert_eq!(StepStatus::Skipped.to_string(), "skipped");
    }
}
