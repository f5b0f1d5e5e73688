//! Orchestrator: runs the declared stages in order and decides after each one
//! whether the run continues.

use crate::definition::{StepDefaults, StepDefinition};
use crate::executor::StepExecutor;
use crate::observer::{Observer, SilentObserver};
use crate::report::WorkflowReport;
use crate::retry::TokioSleeper;
use crate::state::WorkflowState;
use curator_core::{Context, Sleeper, StepError, StepName, WorkerInput, WorkflowError};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A validated, reusable pipeline.
///
/// Running a workflow never fails: every worker error, timeout and panic ends
/// up in the returned [`WorkflowReport`].
pub struct Workflow {
    steps: Vec<StepDefinition>,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn Observer>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("steps", &self.step_names().collect::<Vec<_>>())
            .field("observer", &self.observer)
            .finish()
    }
}

impl Workflow {
    /// Creates a new workflow builder.
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> impl Iterator<Item = &StepName> {
        self.steps.iter().map(StepDefinition::name)
    }

    /// Whether a step named `name` is declared.
    pub fn has_step(&self, name: &str) -> bool {
        self.steps.iter().any(|s| s.name() == name)
    }

    /// Number of declared steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Step definitions in execution order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Runs every stage in declared order.
    ///
    /// A failed stage with the abort policy ends the run; the remaining
    /// stages are reported as not attempted. The context is shared read-only
    /// with every worker, along with the artifacts of the stages recorded so
    /// far.
    pub async fn run(&self, context: &Context) -> WorkflowReport {
        let names: Vec<StepName> = self.step_names().cloned().collect();
        let total = names.len();
        let mut state = WorkflowState::new(names);
        let executor = StepExecutor::new(Arc::clone(&self.sleeper), Arc::clone(&self.observer));

        info!("Starting workflow {} with {} step(s)", state.run_id(), total);
        self.observer.run_started(state.run_id(), state.declared());

        while state.is_running() {
            let position = state.stage_index();
            let Some(step) = self.steps.get(position) else {
                break;
            };

            match step.description() {
                Some(description) => info!(
                    "STEP {}/{}: {} ({})",
                    position + 1,
                    total,
                    step.name(),
                    description
                ),
                None => info!("STEP {}/{}: {}", position + 1, total, step.name()),
            }
            self.observer.step_started(step.name(), position, total);

            let outcome = match step.input_requirement().check(|s| state.succeeded(s)) {
                Ok(()) => {
                    let input = WorkerInput::new(
                        step.name().clone(),
                        context.clone(),
                        Arc::new(state.artifacts()),
                    );
                    executor.run(step, position, input).await
                }
                Err(missing) => StepExecutor::skipped(step, position, &missing),
            };

            if outcome.succeeded() {
                info!(
                    "Step '{}' succeeded after {} attempt(s) in {}ms",
                    outcome.step,
                    outcome.attempts,
                    outcome.elapsed.as_millis()
                );
            } else if outcome.aborts_workflow() {
                error!(
                    "Step '{}' {}, aborting workflow: {}",
                    outcome.step,
                    outcome.status,
                    describe_error(&outcome.error)
                );
            } else {
                warn!(
                    "Step '{}' {}, continuing degraded: {}",
                    outcome.step,
                    outcome.status,
                    describe_error(&outcome.error)
                );
            }
            self.observer.step_finished(&outcome);

            if let Err(e) = state.record(outcome) {
                error!("Failed to record step '{}': {}", step.name(), e);
                state.abort();
                break;
            }
        }

        let report = state.finish();
        info!(
            "Workflow {} {} in {}ms (overall success: {})",
            report.run_id(),
            report.status(),
            report.total_duration_ms(),
            report.overall_success()
        );
        self.observer.run_finished(&report);
        report
    }
}

fn describe_error(error: &Option<StepError>) -> String {
    error
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "no detail".to_string())
}

/// Builds and validates a [`Workflow`].
///
/// # Examples
///
/// ```
/// use curator::{FnWorker, Payload, StepDefinition, StepError, Workflow, WorkerInput};
///
/// let workflow = Workflow::builder()
///     .step(StepDefinition::new("news").worker(FnWorker::new("gatherer", |_: WorkerInput| async {
///         Ok::<_, StepError>(Payload::new())
///     })))
///     .build()
///     .unwrap();
///
/// assert!(workflow.has_step("news"));
/// ```
pub struct WorkflowBuilder {
    steps: Vec<StepDefinition>,
    defaults: StepDefaults,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn Observer>,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkflowBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowBuilder")
            .field("steps", &self.steps)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl WorkflowBuilder {
    /// Empty builder with default step settings and the tokio timer.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            defaults: StepDefaults::default(),
            sleeper: Arc::new(TokioSleeper),
            observer: Arc::new(SilentObserver),
        }
    }

    /// Appends a stage. Stages run in the order they are added.
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends several stages in order.
    pub fn steps(mut self, steps: impl IntoIterator<Item = StepDefinition>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Settings for steps that do not choose their own.
    pub fn defaults(mut self, defaults: StepDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Replaces the backoff timer.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replaces the run observer.
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Validates the step graph and applies the defaults.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::Configuration(
                "Workflow must declare at least one step".to_string(),
            ));
        }

        let mut seen: HashSet<&StepName> = HashSet::new();
        for step in &self.steps {
            if step.workers().is_empty() {
                return Err(WorkflowError::NoWorkers(step.name().clone()));
            }
            for required in step.input_requirement().steps() {
                if !seen.contains(required) {
                    return Err(WorkflowError::UnknownInput {
                        step_name: step.name().clone(),
                        required: required.clone(),
                    });
                }
            }
            if !seen.insert(step.name()) {
                return Err(WorkflowError::DuplicateStep(step.name().clone()));
            }
        }

        let mut steps = self.steps;
        for step in &mut steps {
            step.apply_defaults(&self.defaults);
        }

        Ok(Workflow {
            steps,
            sleeper: self.sleeper,
            observer: self.observer,
        })
    }
}

/// Builds a workflow with default settings and runs it once.
pub async fn run_workflow(
    steps: impl IntoIterator<Item = StepDefinition>,
    context: &Context,
) -> Result<WorkflowReport, WorkflowError> {
    let workflow = Workflow::builder().steps(steps).build()?;
    Ok(workflow.run(context).await)
}
