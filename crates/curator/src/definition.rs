//! Declaring pipeline steps.

use curator_core::{FailurePolicy, InputRequirement, RetryPolicy, StepName, Worker};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Settings applied to every step that does not choose its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefaults {
    pub retry_policy: RetryPolicy,
    pub failure_policy: FailurePolicy,
    pub timeout: Option<Duration>,
    pub attempt_timeout: Option<Duration>,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            failure_policy: FailurePolicy::AbortWorkflow,
            timeout: None,
            attempt_timeout: None,
        }
    }
}

/// One named stage of the pipeline.
///
/// A step owns one or more workers. With more than one worker the step fans
/// out: every worker runs concurrently and the step succeeds only if all of
/// them do.
///
/// # Examples
///
/// ```
/// use curator::{FailurePolicy, FnWorker, InputRequirement, Payload, RetryPolicy, StepDefinition, StepError, WorkerInput};
/// use std::time::Duration;
///
/// let social = StepDefinition::new("social_media_monitoring")
///     .describe("Monitor social media accounts for relevant posts")
///     .worker(FnWorker::new("x", |_: WorkerInput| async { Ok::<_, StepError>(Payload::new()) }))
///     .worker(FnWorker::new("linkedin", |_: WorkerInput| async { Ok::<_, StepError>(Payload::new()) }))
///     .retry(RetryPolicy::exponential(3, Duration::from_millis(500)))
///     .on_failure(FailurePolicy::ContinueDegraded)
///     .timeout(Duration::from_secs(120))
///     .requires(InputRequirement::None);
///
/// assert_eq!(social.workers().len(), 2);
/// ```
#[derive(Clone)]
pub struct StepDefinition {
    name: StepName,
    description: Option<String>,
    workers: Vec<Arc<dyn Worker>>,
    retry_policy: Option<RetryPolicy>,
    failure_policy: Option<FailurePolicy>,
    timeout: Option<Duration>,
    attempt_timeout: Option<Duration>,
    requires: InputRequirement,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field(
                "workers",
                &self.workers.iter().map(|w| w.name()).collect::<Vec<_>>(),
            )
            .field("retry_policy", &self.retry_policy)
            .field("failure_policy", &self.failure_policy)
            .field("timeout", &self.timeout)
            .field("requires", &self.requires)
            .finish()
    }
}

impl StepDefinition {
    /// Creates a step without workers.
    pub fn new(name: impl Into<StepName>) -> Self {
        Self {
            name: name.into(),
            description: None,
            workers: Vec::new(),
            retry_policy: None,
            failure_policy: None,
            timeout: None,
            attempt_timeout: None,
            requires: InputRequirement::None,
        }
    }

    /// Adds a worker invocation.
    pub fn worker<W: Worker + 'static>(self, worker: W) -> Self {
        self.shared_worker(Arc::new(worker))
    }

    /// Adds a worker invocation that may be shared with other steps.
    pub fn shared_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.workers.push(worker);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Bounds the whole step, every sub-task and retry included.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Bounds each individual attempt. Timed out attempts are retried.
    pub fn attempt_timeout(mut self, limit: Duration) -> Self {
        self.attempt_timeout = Some(limit);
        self
    }

    pub fn requires(mut self, requirement: InputRequirement) -> Self {
        self.requires = requirement;
        self
    }

    pub fn name(&self) -> &StepName {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn workers(&self) -> &[Arc<dyn Worker>] {
        &self.workers
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone().unwrap_or_default()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
            .unwrap_or(StepDefaults::default().failure_policy)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn per_attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    pub fn input_requirement(&self) -> &InputRequirement {
        &self.requires
    }

    /// Fills every setting the step left open.
    pub(crate) fn apply_defaults(&mut self, defaults: &StepDefaults) {
        self.retry_policy
            .get_or_insert_with(|| defaults.retry_policy.clone());
        self.failure_policy.get_or_insert(defaults.failure_policy);
        if self.timeout.is_none() {
            self.timeout = defaults.timeout;
        }
        if self.attempt_timeout.is_none() {
            self.attempt_timeout = defaults.attempt_timeout;
        }
    }
}
