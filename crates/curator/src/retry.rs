//! Retry-with-backoff around a single worker invocation.

use crate::observer::Observer;
use async_trait::async_trait;
use curator_core::{
    AttemptRecord, RetryPolicy, Sleeper, StepError, StepName, StepResult, SubtaskOutcome, Worker,
    WorkerInput,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What to do after an attempt finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The attempt succeeded.
    Done,
    /// Wait for the given delay, then attempt again.
    RetryAfter(Duration),
    /// Fatal error or attempts exhausted.
    GiveUp,
}

/// Attempt-state machine: how many attempts were made, the last error seen
/// and what comes next. Holds no timers, so schedules can be checked without
/// waiting.
///
/// ```
/// use curator::{RetryDecision, RetryState};
/// use curator::{RetryPolicy, StepError, StepResult};
/// use std::time::Duration;
///
/// let mut state = RetryState::new(RetryPolicy::exponential(3, Duration::from_millis(100)));
/// let failure = StepResult::error(StepError::retryable("503"), Duration::ZERO);
///
/// assert_eq!(state.begin(), 1);
/// assert_eq!(state.record(&failure), RetryDecision::RetryAfter(Duration::from_millis(100)));
/// assert_eq!(state.begin(), 2);
/// assert_eq!(state.record(&failure), RetryDecision::RetryAfter(Duration::from_millis(200)));
/// assert_eq!(state.begin(), 3);
/// assert_eq!(state.record(&failure), RetryDecision::GiveUp);
/// ```
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
    last_error: Option<StepError>,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_error: None,
        }
    }

    /// Starts the next attempt and returns its 1-based number.
    pub fn begin(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn last_error(&self) -> Option<&StepError> {
        self.last_error.as_ref()
    }

    /// Feeds the result of the current attempt and decides what comes next.
    pub fn record(&mut self, result: &StepResult) -> RetryDecision {
        if result.is_ok() {
            return RetryDecision::Done;
        }
        let retryable = result.error.as_ref().is_some_and(StepError::is_retryable);
        self.last_error = result.error.clone();
        if !retryable || self.attempt >= self.policy.max_attempts() {
            return RetryDecision::GiveUp;
        }
        let delay = self
            .policy
            .delay_for_retry(self.attempt.saturating_sub(1))
            .unwrap_or(Duration::ZERO);
        RetryDecision::RetryAfter(delay)
    }
}

/// Runs one worker under a retry policy.
///
/// Each sub-task of a step gets its own `Retrier`, so one sub-task's backoff
/// never holds up another.
#[derive(Debug, Clone)]
pub struct Retrier {
    step: StepName,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn Observer>,
    attempt_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl Retrier {
    pub fn new(
        step: StepName,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            step,
            policy,
            sleeper,
            observer,
            attempt_timeout: None,
            deadline: None,
        }
    }

    /// Bounds every single attempt.
    pub fn with_attempt_timeout(mut self, limit: Option<Duration>) -> Self {
        self.attempt_timeout = limit;
        self
    }

    /// Bounds the whole invocation, retries and backoff included.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Calls the worker until it succeeds, fails fatally, runs out of
    /// attempts, or the deadline passes.
    pub async fn run(&self, worker: &dyn Worker, input: &WorkerInput) -> SubtaskOutcome {
        let started = Instant::now();
        let worker_name = worker.name();
        let max_attempts = self.policy.max_attempts();
        let mut state = RetryState::new(self.policy.clone());
        let mut attempts = Vec::new();

        loop {
            let attempt = state.begin();
            debug!(
                "Step '{}' worker '{}' attempt {}/{}",
                self.step, worker_name, attempt, max_attempts
            );
            let result = self.attempt_once(worker, input).await;
            let decision = state.record(&result);

            let (decision, out_of_time) = match decision {
                RetryDecision::RetryAfter(delay) if self.would_pass_deadline(delay) => {
                    (RetryDecision::GiveUp, true)
                }
                other => (other, false),
            };
            let delay = match decision {
                RetryDecision::RetryAfter(delay) => Some(delay),
                _ => None,
            };

            let record = AttemptRecord {
                attempt,
                result,
                delay,
            };
            self.observer
                .attempt_finished(&self.step, &worker_name, &record);
            let last = record.result.clone();
            attempts.push(record);

            match decision {
                RetryDecision::Done => {
                    info!(
                        "Step '{}' worker '{}' succeeded on attempt {}",
                        self.step, worker_name, attempt
                    );
                    let payload = last.payload.unwrap_or_default();
                    return SubtaskOutcome {
                        worker: worker_name,
                        result: StepResult::ok(payload, started.elapsed()),
                        attempts,
                    };
                }
                RetryDecision::GiveUp => {
                    let error = if out_of_time {
                        StepError::timeout(format!(
                            "step deadline reached after {} attempt(s)",
                            attempt
                        ))
                    } else {
                        last.error
                            .unwrap_or_else(|| StepError::fatal("worker failed without detail"))
                    };
                    warn!(
                        "Step '{}' worker '{}' failed after {} attempt(s): {}",
                        self.step, worker_name, attempt, error
                    );
                    return SubtaskOutcome {
                        worker: worker_name,
                        result: StepResult::error(error, started.elapsed()),
                        attempts,
                    };
                }
                RetryDecision::RetryAfter(delay) => {
                    info!(
                        "Step '{}' worker '{}' failed, retrying ({}/{}) in {}ms",
                        self.step,
                        worker_name,
                        attempt + 1,
                        max_attempts,
                        delay.as_millis()
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_once(&self, worker: &dyn Worker, input: &WorkerInput) -> StepResult {
        let started = Instant::now();
        let remaining = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(started));
        let (limit, limited_by_deadline) = match (self.attempt_timeout, remaining) {
            (Some(own), Some(left)) if left < own => (Some(left), true),
            (Some(own), _) => (Some(own), false),
            (None, Some(left)) => (Some(left), true),
            (None, None) => (None, false),
        };

        // A panic ends this attempt only, earlier attempt records survive.
        let call = AssertUnwindSafe(worker.execute(input))
            .catch_unwind()
            .map(|caught| {
                caught.unwrap_or_else(|_| {
                    error!("Step '{}' worker '{}' panicked", self.step, worker.name());
                    Err(StepError::fatal("worker panicked"))
                })
            });

        let result = match limit {
            Some(limit) => match timeout(limit, call).await {
                Ok(result) => result,
                Err(_) if limited_by_deadline => Err(StepError::timeout(format!(
                    "step deadline exceeded after {}ms",
                    limit.as_millis()
                ))),
                Err(_) => Err(StepError::timeout(format!(
                    "attempt exceeded {}ms",
                    limit.as_millis()
                ))),
            },
            None => call.await,
        };
        StepResult::from_result(result, started.elapsed())
    }

    fn would_pass_deadline(&self, delay: Duration) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() + delay >= deadline)
    }
}
