//! Step orchestrator for multi-stage content pipelines.
//!
//! A [`Workflow`] runs named stages strictly in order. Each stage holds one or
//! more [`Worker`]s; several workers fan out as concurrent tokio tasks and are
//! joined before the next stage starts. Every worker invocation is retried
//! with capped exponential backoff, and a failed stage either aborts the run
//! or lets it continue degraded. A [`WorkflowReport`] is produced for every
//! run, aborted ones included.
//!
//! # Example
//!
//! ```rust,no_run
//! use curator::prelude::*;
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct NewsGatherer;
//!
//! #[async_trait]
//! impl Worker for NewsGatherer {
//!     async fn execute(&self, _input: &WorkerInput) -> Result<Payload, StepError> {
//!         Ok(Payload::new().with("curated_content", "3 articles"))
//!     }
//!
//!     fn name(&self) -> WorkerName {
//!         WorkerName::new("news_gatherer")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let workflow = Workflow::builder()
//!         .step(StepDefinition::new("news_gathering").worker(NewsGatherer))
//!         .build()
//!         .expect("valid workflow");
//!
//!     let report = workflow.run(&Context::new()).await;
//!     println!("{}", report.to_markdown());
//! }
//! ```

mod config;
mod definition;
mod executor;
mod observer;
mod report;
mod retry;
mod state;
mod workflow;

// Re-export core types
pub use curator_core::*;

pub use config::{ConfigError, PipelineConfig};
pub use definition::{StepDefaults, StepDefinition};
pub use executor::StepExecutor;
pub use observer::{Observer, SilentObserver};
pub use report::{ReportSummary, StepReport, WorkflowReport};
pub use retry::{Retrier, RetryDecision, RetryState, TokioSleeper};
pub use state::{RunStatus, StateError, TerminalStatus, WorkflowState};
pub use workflow::{run_workflow, Workflow, WorkflowBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        run_workflow, Context, FailurePolicy, InputRequirement, Payload, PipelineConfig,
        RetryPolicy, StepDefinition, StepError, Worker, WorkerInput, WorkerName, Workflow,
        WorkflowBuilder, WorkflowError, WorkflowReport,
    };
}
