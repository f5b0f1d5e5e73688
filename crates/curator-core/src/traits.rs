//! Seams between the engine and the outside world.

use crate::context::WorkerInput;
use crate::error::StepError;
use crate::payload::Payload;
use crate::step::WorkerName;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::future::Future;
use std::time::Duration;

/// A unit of pipeline work: gathers news, watches social accounts, drafts
/// content, compiles output, ...
///
/// Workers only return values. Errors are reported through [`StepError`]
/// whose [`kind`](StepError::kind) decides whether the engine retries.
///
/// # Examples
///
/// ```
/// use curator_core::{Payload, StepError, Worker, WorkerInput, WorkerName};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct NewsGatherer;
///
/// #[async_trait]
/// impl Worker for NewsGatherer {
///     async fn execute(&self, input: &WorkerInput) -> Result<Payload, StepError> {
///         let keywords = input
///             .context()
///             .get::<Vec<String>>("keywords")
///             .ok_or_else(|| StepError::fatal("no keywords configured"))?;
///         Ok(Payload::new().with("curated_content", keywords.join(", ")))
///     }
///
///     fn name(&self) -> WorkerName {
///         WorkerName::new("news_gatherer")
///     }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync + Debug {
    /// Runs the worker once.
    async fn execute(&self, input: &WorkerInput) -> Result<Payload, StepError>;

    /// Returns the worker name.
    fn name(&self) -> WorkerName;
}

/// Waits out backoff delays. Swap in a recording implementation to test
/// retry schedules without real time passing.
#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    async fn sleep(&self, duration: Duration);
}

/// Adapts an async closure into a [`Worker`].
///
/// ```
/// use curator_core::{FnWorker, Payload, StepError, Worker, WorkerInput};
///
/// let worker = FnWorker::new("compile", |_input: WorkerInput| async {
///     Ok::<_, StepError>(Payload::new().with("final_content", "done"))
/// });
/// assert_eq!(worker.name().as_str(), "compile");
/// ```
pub struct FnWorker<F> {
    name: WorkerName,
    f: F,
}

impl<F> FnWorker<F> {
    pub fn new(name: impl Into<WorkerName>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Debug for FnWorker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWorker").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Worker for FnWorker<F>
where
    F: Fn(WorkerInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Payload, StepError>> + Send,
{
    async fn execute(&self, input: &WorkerInput) -> Result<Payload, StepError> {
        (self.f)(input.clone()).await
    }

    fn name(&self) -> WorkerName {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::payload::Artifacts;
    use crate::step::StepName;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_worker_sees_context() {
        let worker = FnWorker::new("echo", |input: WorkerInput| async move {
            let brand = input
                .context()
                .get::<String>("brand")
                .cloned()
                .ok_or_else(|| StepError::fatal("brand missing"))?;
            Ok::<_, StepError>(Payload::new().with("brand", brand))
        });

        let input = WorkerInput::new(
            StepName::new("echo_step"),
            Context::builder().insert("brand", "Acme".to_string()).build(),
            Arc::new(Artifacts::new()),
        );
        let payload = worker.execute(&input).await;
        assert_eq!(
            payload.ok().and_then(|p| p.get("brand").cloned()),
            Some(serde_json::json!("Acme"))
        );
        assert_eq!(worker.name(), WorkerName::new("echo"));
    }

    #[tokio::test]
    async fn test_fn_worker_propagates_error() {
        let worker = FnWorker::new("broken", |_input: WorkerInput| async {
            Err::<Payload, _>(StepError::retryable("503"))
        });
        let input = WorkerInput::new(
            StepName::new("s"),
            Context::new(),
            Arc::new(Artifacts::new()),
        );
        assert_eq!(worker.execute(&input).await, Err(StepError::retryable("503")));
    }
}
