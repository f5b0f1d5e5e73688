//! Run bookkeeping: which steps ran, in what order, and how the run ends.

use crate::report::WorkflowReport;
use chrono::{DateTime, Utc};
use curator_core::{Artifacts, StepName, StepOutcome};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Status of a run while it is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
}

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    Completed,
    Aborted,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Completed => write!(f, "completed"),
            TerminalStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Rejected attempts to record an outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Run is no longer running")]
    NotRunning,

    #[error("Step '{0}' is not part of this run")]
    Undeclared(StepName),

    #[error("Step '{0}' was already recorded")]
    AlreadyRecorded(StepName),

    #[error("Step '{got}' recorded out of order, expected '{expected}'")]
    OutOfOrder { expected: StepName, got: StepName },
}

/// Accumulates step outcomes for one run.
///
/// Outcomes must arrive in declaration order. Recording an outcome that
/// aborts the workflow ends the run immediately; recording the last declared
/// step completes it.
#[derive(Debug)]
pub struct WorkflowState {
    run_id: String,
    declared: Vec<StepName>,
    outcomes: IndexMap<StepName, StepOutcome>,
    status: RunStatus,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl WorkflowState {
    /// Starts a run over `declared` steps; an empty list is already complete.
    pub fn new(declared: Vec<StepName>) -> Self {
        let started_at = Utc::now();
        let status = if declared.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Running
        };
        Self {
            run_id: new_run_id(started_at),
            declared,
            outcomes: IndexMap::new(),
            status,
            started_at,
            started: Instant::now(),
        }
    }

    /// Records the next step's outcome, advancing or ending the run.
    pub fn record(&mut self, outcome: StepOutcome) -> Result<(), StateError> {
        if self.status != RunStatus::Running {
            return Err(StateError::NotRunning);
        }
        if !self.declared.contains(&outcome.step) {
            return Err(StateError::Undeclared(outcome.step));
        }
        if self.outcomes.contains_key(&outcome.step) {
            return Err(StateError::AlreadyRecorded(outcome.step));
        }
        let expected = &self.declared[self.outcomes.len()];
        if *expected != outcome.step {
            return Err(StateError::OutOfOrder {
                expected: expected.clone(),
                got: outcome.step,
            });
        }

        let aborts = outcome.aborts_workflow();
        self.outcomes.insert(outcome.step.clone(), outcome);
        if aborts {
            self.status = RunStatus::Aborted;
        } else if self.outcomes.len() == self.declared.len() {
            self.status = RunStatus::Completed;
        }
        Ok(())
    }

    /// Ends a running run early; remaining steps are left unattempted.
    pub fn abort(&mut self) {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Aborted;
        }
    }

    /// Unique id of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Index of the next step to run.
    pub fn stage_index(&self) -> usize {
        self.outcomes.len()
    }

    /// Current run status.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Whether more steps may still be recorded.
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Step names in execution order.
    pub fn declared(&self) -> &[StepName] {
        &self.declared
    }

    /// Recorded outcome of `step`, if it has run.
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.outcomes.get(step)
    }

    /// Whether `step` ran and succeeded.
    pub fn succeeded(&self, step: &StepName) -> bool {
        self.outcomes
            .get(step)
            .is_some_and(StepOutcome::succeeded)
    }

    /// Recorded outcomes in execution order.
    pub fn outcomes(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.values()
    }

    /// Payloads recorded so far, keyed by step.
    ///
    /// Failed steps contribute whatever their successful sub-tasks produced.
    pub fn artifacts(&self) -> Artifacts {
        let mut artifacts = Artifacts::new();
        for outcome in self.outcomes.values() {
            if !outcome.payload.is_empty() {
                artifacts.insert(outcome.step.clone(), outcome.payload.clone());
            }
        }
        artifacts
    }

    /// Wall-clock start of the run.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Closes the run.
    ///
    /// Callers end runs through [`record`](Self::record) or
    /// [`abort`](Self::abort); a run finished while still running is
    /// reported as aborted.
    pub fn finish(mut self) -> WorkflowReport {
        if self.status == RunStatus::Running {
            warn!("Run {} finished while still running, reporting it as aborted", self.run_id);
            self.abort();
        }
        let status = match self.status {
            RunStatus::Completed => TerminalStatus::Completed,
            RunStatus::Running | RunStatus::Aborted => TerminalStatus::Aborted,
        };
        let artifacts = self.artifacts();
        let elapsed = self.elapsed();
        let outcomes: Vec<StepOutcome> = self.outcomes.into_values().collect();
        let not_attempted = self.declared[outcomes.len()..].to_vec();
        WorkflowReport::new(
            self.run_id,
            status,
            self.started_at,
            outcomes,
            not_attempted,
            artifacts,
            elapsed,
        )
    }
}

fn new_run_id(started_at: DateTime<Utc>) -> String {
    let sequence = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "workflow_{}_{}",
        started_at.format("%Y%m%d_%H%M%S_%3f"),
        sequence
    )
}
