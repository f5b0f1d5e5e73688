//! Error types.

use crate::step::{RetryPolicyError, StepName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Transient failure (network, rate limit, ...). Worth retrying.
    Retryable,
    /// Invalid input or configuration. Retrying won't help.
    Fatal,
    /// The attempt or the step ran out of time.
    Timeout,
    /// One or more sub-tasks of a parallel step failed.
    Aggregate,
}

impl ErrorKind {
    /// Whether another attempt may be made after an error of this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Retryable | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Retryable => write!(f, "retryable"),
            ErrorKind::Fatal => write!(f, "fatal"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Aggregate => write!(f, "aggregate"),
        }
    }
}

/// Markers of errors that no retry can fix.
const NON_RETRYABLE_MARKERS: [&str; 3] = ["authentication", "authorization", "invalid_api_key"];

/// Error reported by a worker, or synthesized by the engine for timeouts and
/// failed parallel steps.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StepError {
    /// How the failure is classified.
    pub kind: ErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl StepError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a retryable error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    /// Creates a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Classifies an untyped error message.
    ///
    /// Authentication and credential problems are fatal, anything else is
    /// assumed transient.
    ///
    /// ```
    /// use curator_core::{ErrorKind, StepError};
    ///
    /// assert_eq!(StepError::from_message("HTTP 503").kind, ErrorKind::Retryable);
    /// assert_eq!(StepError::from_message("Invalid_API_Key supplied").kind, ErrorKind::Fatal);
    /// ```
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if NON_RETRYABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
            Self::fatal(message)
        } else {
            Self::retryable(message)
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Errors raised while assembling a workflow. Runs themselves never fail:
/// worker failures end up in the report.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// Two steps share a name.
    #[error("Duplicate step name: {0}")]
    DuplicateStep(StepName),

    /// A step was declared without any worker.
    #[error("Step '{0}' has no workers")]
    NoWorkers(StepName),

    /// A step requires the output of a step that does not run before it.
    #[error("Step '{step_name}' requires '{required}', which is not an earlier step")]
    UnknownInput {
        /// The step declaring the requirement.
        step_name: StepName,
        /// The missing upstream step.
        required: StepName,
    },

    /// Invalid backoff parameters.
    #[error("Invalid retry policy: {0}")]
    RetryPolicy(#[from] RetryPolicyError),

    /// The workflow configuration is invalid.
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),
}
