//! Runs one step: fans its workers out, joins them and merges the results.

use crate::definition::StepDefinition;
use crate::observer::Observer;
use crate::retry::Retrier;
use curator_core::{
    ErrorKind, Payload, Sleeper, StepError, StepName, StepOutcome, StepResult, StepStatus,
    SubtaskOutcome, WorkerInput, WorkerName,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{error, warn};

/// Executes steps under their retry policy.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn Observer>,
}

impl StepExecutor {
    pub fn new(sleeper: Arc<dyn Sleeper>, observer: Arc<dyn Observer>) -> Self {
        Self { sleeper, observer }
    }

    /// Runs every worker of `step` as its own task and waits for all of them.
    ///
    /// Never fails: worker errors, timeouts and panics all end up in the
    /// returned outcome.
    pub async fn run(&self, step: &StepDefinition, position: usize, input: WorkerInput) -> StepOutcome {
        let started = Instant::now();
        let deadline = step.step_timeout().map(|limit| started + limit);
        let policy = step.retry_policy();

        let spawned: Vec<_> = step
            .workers()
            .iter()
            .map(|worker| {
                let retrier = Retrier::new(
                    step.name().clone(),
                    policy.clone(),
                    Arc::clone(&self.sleeper),
                    Arc::clone(&self.observer),
                )
                .with_attempt_timeout(step.per_attempt_timeout())
                .with_deadline(deadline);
                let worker = Arc::clone(worker);
                let input = input.clone();
                let name = worker.name();
                let handle =
                    tokio::spawn(async move { retrier.run(worker.as_ref(), &input).await });
                (name, handle)
            })
            .collect();

        // Join in declaration order; slot i always holds worker i.
        let mut tasks = SubtaskGuard(spawned);
        let mut results = Vec::with_capacity(tasks.0.len());
        for (name, handle) in tasks.0.iter_mut() {
            let name = name.clone();
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(
                        "Step '{}' worker '{}' did not finish: {}",
                        step.name(),
                        name,
                        join_error
                    );
                    SubtaskOutcome {
                        worker: name,
                        result: StepResult::error(lost_task_error(&join_error), started.elapsed()),
                        attempts: Vec::new(),
                    }
                }
            };
            results.push(outcome);
        }

        merge(step, position, results, started.elapsed())
    }

    /// Outcome for a step whose input requirement was not met.
    pub fn skipped(step: &StepDefinition, position: usize, missing: &[StepName]) -> StepOutcome {
        let missing = missing
            .iter()
            .map(StepName::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            "Step '{}' skipped: no input from {}",
            step.name(),
            missing
        );
        StepOutcome {
            step: step.name().clone(),
            position,
            policy: step.failure_policy(),
            status: StepStatus::Skipped,
            attempts: 0,
            max_attempts: step.retry_policy().max_attempts(),
            subtasks: Vec::new(),
            payload: Payload::new(),
            error: Some(StepError::fatal(format!(
                "required input missing from: {}",
                missing
            ))),
            elapsed: Duration::ZERO,
        }
    }
}

/// Aborts sub-tasks still running when the step future is dropped.
struct SubtaskGuard(Vec<(WorkerName, JoinHandle<SubtaskOutcome>)>);

impl Drop for SubtaskGuard {
    fn drop(&mut self) {
        for (_, handle) in &self.0 {
            handle.abort();
        }
    }
}

/// Panics inside an attempt are caught by the retrier; this covers the rest.
fn lost_task_error(join_error: &JoinError) -> StepError {
    if join_error.is_panic() {
        StepError::fatal("worker panicked")
    } else {
        StepError::fatal("worker task was cancelled")
    }
}

/// Folds sub-task outcomes into the step outcome.
///
/// The step succeeds only if every sub-task did. The payload is the union of
/// all successful payloads in declaration order, so partial results survive
/// a failed parallel step.
fn merge(
    step: &StepDefinition,
    position: usize,
    subtasks: Vec<SubtaskOutcome>,
    elapsed: Duration,
) -> StepOutcome {
    let attempts = subtasks
        .iter()
        .map(SubtaskOutcome::attempt_count)
        .max()
        .unwrap_or(0);

    let mut payload = Payload::new();
    for subtask in &subtasks {
        if let Some(part) = &subtask.result.payload {
            payload.merge(part.clone());
        }
    }

    let failed: Vec<&SubtaskOutcome> = subtasks.iter().filter(|s| !s.succeeded()).collect();
    let (status, error) = match failed.as_slice() {
        [] => (StepStatus::Succeeded, None),
        [only] if subtasks.len() == 1 => (StepStatus::Failed, only.result.error.clone()),
        _ => {
            let details = failed
                .iter()
                .map(|s| match &s.result.error {
                    Some(error) => format!("{} ({})", s.worker, error),
                    None => s.worker.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            let message = format!(
                "{} of {} sub-tasks failed: {}",
                failed.len(),
                subtasks.len(),
                details
            );
            (
                StepStatus::Failed,
                Some(StepError::new(ErrorKind::Aggregate, message)),
            )
        }
    };

    StepOutcome {
        step: step.name().clone(),
        position,
        policy: step.failure_policy(),
        status,
        attempts,
        max_attempts: step.retry_policy().max_attempts(),
        subtasks,
        payload,
        error,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::SilentObserver;
    use async_trait::async_trait;
    use curator_core::{
        Artifacts, Context, FailurePolicy, RetryPolicy, Worker, WorkerName,
    };
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct InstantSleeper;

    #[async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }

    #[derive(Debug)]
    struct Platform {
        name: &'static str,
        error: Option<StepError>,
        calls: Arc<AtomicU32>,
    }

    impl Platform {
        fn ok(name: &'static str) -> Self {
            Self {
                name,
                error: None,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn failing(name: &'static str, error: StepError) -> Self {
            Self {
                error: Some(error),
                ..Self::ok(name)
            }
        }
    }

    #[async_trait]
    impl Worker for Platform {
        async fn execute(&self, _input: &WorkerInput) -> Result<Payload, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.error {
                Some(error) => Err(error.clone()),
                None => Ok(Payload::new().with(format!("{}_posts", self.name), 3)),
            }
        }

        fn name(&self) -> WorkerName {
            WorkerName::new(self.name)
        }
    }

    #[derive(Debug)]
    struct Panicking;

    #[async_trait]
    impl Worker for Panicking {
        #[allow(clippy::panic)]
        async fn execute(&self, _input: &WorkerInput) -> Result<Payload, StepError> {
            panic!("scraper blew up")
        }

        fn name(&self) -> WorkerName {
            WorkerName::new("panicking")
        }
    }

    #[derive(Debug)]
    struct SlowPublisher {
        published: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Worker for SlowPublisher {
        async fn execute(&self, _input: &WorkerInput) -> Result<Payload, StepError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.published.store(true, Ordering::SeqCst);
            Ok(Payload::new())
        }

        fn name(&self) -> WorkerName {
            WorkerName::new("publisher")
        }
    }

    fn executor() -> StepExecutor {
        StepExecutor::new(Arc::new(InstantSleeper), Arc::new(SilentObserver))
    }

    fn input(step: &str) -> WorkerInput {
        WorkerInput::new(StepName::new(step), Context::new(), Arc::new(Artifacts::new()))
    }

    #[tokio::test]
    async fn test_single_worker_error_is_passed_through() {
        let step = StepDefinition::new("news")
            .worker(Platform::failing("news", StepError::fatal("bad query")))
            .retry(RetryPolicy::fixed(3, Duration::ZERO));

        let outcome = executor().run(&step, 0, input("news")).await;

        assert_eq!(outcome.status, StepStatus::Failed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error, Some(StepError::fatal("bad query")));
        assert_eq!(outcome.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_parallel_partial_failure() {
        let linkedin = Platform::failing("linkedin", StepError::retryable("429"));
        let linkedin_calls = Arc::clone(&linkedin.calls);
        let step = StepDefinition::new("social")
            .worker(Platform::ok("x"))
            .worker(linkedin)
            .worker(Platform::ok("bluesky"))
            .retry(RetryPolicy::fixed(3, Duration::ZERO))
            .on_failure(FailurePolicy::ContinueDegraded);

        let outcome = executor().run(&step, 1, input("social")).await;

        assert_eq!(outcome.status, StepStatus::Failed);
        assert_eq!(outcome.position, 1);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(linkedin_calls.load(Ordering::SeqCst), 3);
        let workers: Vec<&str> = outcome.subtasks.iter().map(|s| s.worker.as_str()).collect();
        assert_eq!(workers, vec!["x", "linkedin", "bluesky"]);

        let error = outcome.error.clone().unwrap_or_else(|| StepError::fatal("missing"));
        assert_eq!(error.kind, ErrorKind::Aggregate);
        assert!(error.message.starts_with("1 of 3 sub-tasks failed: linkedin"));
        assert!(outcome.payload.contains_key("x_posts"));
        assert!(outcome.payload.contains_key("bluesky_posts"));
        assert!(!outcome.payload.contains_key("linkedin_posts"));
    }

    #[tokio::test]
    async fn test_parallel_success_unions_payloads() {
        let step = StepDefinition::new("social")
            .worker(Platform::ok("x"))
            .worker(Platform::ok("mastodon"));

        let outcome = executor().run(&step, 0, input("social")).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.payload.len(), 2);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let step = StepDefinition::new("social")
            .worker(Panicking)
            .worker(Platform::ok("x"));

        let outcome = executor().run(&step, 0, input("social")).await;

        assert_eq!(outcome.status, StepStatus::Failed);
        assert_eq!(
            outcome.subtasks[0].result.error,
            Some(StepError::fatal("worker panicked"))
        );
        assert!(outcome.subtasks[1].succeeded());
    }

    #[tokio::test]
    async fn test_dropped_step_aborts_workers() {
        let published = Arc::new(AtomicBool::new(false));
        let step = StepDefinition::new("publish")
            .worker(SlowPublisher {
                published: Arc::clone(&published),
            })
            .worker(Platform::ok("x"));

        let executor = executor();
        let cut_short = tokio::time::timeout(
            Duration::from_millis(20),
            executor.run(&step, 0, input("publish")),
        )
        .await;
        assert!(cut_short.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!published.load(Ordering::SeqCst));
    }

    #[test]
    fn test_skipped_outcome() {
        let step = StepDefinition::new("content").worker(Platform::ok("writer"));
        let outcome =
            StepExecutor::skipped(&step, 2, &[StepName::new("news"), StepName::new("social")]);

        assert_eq!(outcome.status, StepStatus::Skipped);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(
            outcome.error.map(|e| e.message),
            Some("required input missing from: news, social".to_string())
        );
    }
}
