//! Step identity and per-step policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new name.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Returns the name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

name_type!(
    /// Type-safe step name wrapper.
    StepName
);

name_type!(
    /// Name of one worker invocation inside a step. Parallel sub-tasks are
    /// told apart by this name in diagnostics.
    WorkerName
);

/// What happens to the run when a step fails after exhausting its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the run; later stages are never attempted.
    AbortWorkflow,
    /// Record the failure and move on to the next stage.
    ContinueDegraded,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::AbortWorkflow => write!(f, "abort-workflow"),
            FailurePolicy::ContinueDegraded => write!(f, "continue-degraded"),
        }
    }
}

/// Which earlier steps must have succeeded before a step may run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputRequirement {
    /// The step runs regardless of what happened before.
    #[default]
    None,
    /// Every listed step must have succeeded.
    AllOf(Vec<StepName>),
    /// At least one listed step must have succeeded.
    AnyOf(Vec<StepName>),
}

impl InputRequirement {
    /// Steps referenced by this requirement.
    pub fn steps(&self) -> &[StepName] {
        match self {
            InputRequirement::None => &[],
            InputRequirement::AllOf(steps) | InputRequirement::AnyOf(steps) => steps,
        }
    }

    /// Checks the requirement against a predicate telling whether a step
    /// succeeded. Returns the unmet steps on failure.
    ///
    /// ```
    /// use curator_core::{InputRequirement, StepName};
    ///
    /// let req = InputRequirement::AnyOf(vec!["news".into(), "social".into()]);
    /// assert!(req.check(|s| s == "social").is_ok());
    ///
    /// let missing = req.check(|_| false).unwrap_err();
    /// assert_eq!(missing, vec![StepName::new("news"), StepName::new("social")]);
    /// ```
    pub fn check(&self, succeeded: impl Fn(&StepName) -> bool) -> Result<(), Vec<StepName>> {
        let missing: Vec<StepName> = self
            .steps()
            .iter()
            .filter(|s| !succeeded(s))
            .cloned()
            .collect();
        let met = match self {
            InputRequirement::None => true,
            InputRequirement::AllOf(_) => missing.is_empty(),
            InputRequirement::AnyOf(steps) => steps.is_empty() || missing.len() < steps.len(),
        };
        if met {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

/// Retry policy for worker invocations.
///
/// Every policy makes at least one attempt. `max_attempts` counts the first
/// attempt, so `fixed(3, ..)` means one attempt plus up to two retries.
///
/// # Examples
///
/// ```
/// use curator_core::RetryPolicy;
/// use std::time::Duration;
///
/// // Single attempt
/// let policy = RetryPolicy::None;
/// assert_eq!(policy.max_attempts(), 1);
///
/// // Exponential backoff: 3 attempts, waits of 5s then 10s
/// let policy = RetryPolicy::exponential(3, Duration::from_secs(5));
/// assert_eq!(policy.delay_for_retry(0), Some(Duration::from_secs(5)));
/// assert_eq!(policy.delay_for_retry(1), Some(Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// No retry - fail immediately on error.
    None,
    /// Fixed delay between attempts.
    Fixed {
        /// Maximum number of attempts, first one included.
        max_attempts: u32,
        /// Delay between each attempt.
        delay: Duration,
    },
    /// Exponential backoff with configurable parameters.
    ExponentialBackoff {
        /// Maximum number of attempts, first one included.
        max_attempts: u32,
        /// Delay before the first retry.
        initial_delay: Duration,
        /// Maximum delay cap.
        max_delay: Duration,
        /// Multiplier for each retry.
        multiplier: u32,
    },
}

impl Default for RetryPolicy {
    /// Three attempts, 5s base delay doubled per retry, capped at 60s.
    fn default() -> Self {
        RetryPolicy::exponential(3, Duration::from_secs(5))
    }
}

/// Error returned when [`RetryPolicy`] configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicyError(pub &'static str);

impl std::fmt::Display for RetryPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RetryPolicyError {}

impl RetryPolicy {
    /// Creates a fixed-delay retry policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Creates an exponential backoff policy doubling from `initial_delay`
    /// and capped at 60 seconds.
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    /// Creates an exponential backoff retry policy with custom settings.
    pub fn exponential_backoff(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self, RetryPolicyError> {
        if max_attempts == 0 {
            return Err(RetryPolicyError("max_attempts must be at least 1"));
        }
        if multiplier == 0 {
            return Err(RetryPolicyError("multiplier must be greater than 0"));
        }
        if multiplier > 10 {
            return Err(RetryPolicyError(
                "multiplier must be 10 or less to avoid overflow",
            ));
        }
        if max_delay < initial_delay {
            return Err(RetryPolicyError("max_delay must be >= initial_delay"));
        }
        Ok(RetryPolicy::ExponentialBackoff {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier,
        })
    }

    /// Returns the maximum number of attempts, never less than one.
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::None => 1,
            RetryPolicy::Fixed { max_attempts, .. } => (*max_attempts).max(1),
            RetryPolicy::ExponentialBackoff { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    /// Delay to wait before retry number `retry` (0-indexed, so `0` is the
    /// wait between attempt 1 and attempt 2).
    pub fn delay_for_retry(&self, retry: u32) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let delay = multiplier
                    .checked_pow(retry)
                    .and_then(|factor| initial_delay.checked_mul(factor))
                    .map_or(*max_delay, |delay| delay.min(*max_delay));
                Some(delay)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_name() {
        let name = StepName::new("test");
        assert_eq!(name.as_str(), "test");

        let name: StepName = "test".into();
        assert_eq!(name, "test");
        assert_eq!(WorkerName::new("x").to_string(), "x");
    }

    #[test]
    fn test_failure_policy_display_and_serde() {
        assert_eq!(FailurePolicy::AbortWorkflow.to_string(), "abort-workflow");
        assert_eq!(
            serde_json::to_string(&FailurePolicy::ContinueDegraded).ok(),
            Some("\"continue-degraded\"".to_string())
        );
    }

    #[test]
    fn test_input_requirement_all_of() {
        let req = InputRequirement::AllOf(vec!["news".into(), "social".into()]);
        assert!(req.check(|_| true).is_ok());
        assert_eq!(req.check(|s| s == "news"), Err(vec![StepName::new("social")]));
        assert!(InputRequirement::None.check(|_| false).is_ok());
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for_retry(0), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_for_retry(1), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_retry_policy_fixed() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for_retry(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_retry(2), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_zero_attempts_still_attempts_once() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::None.delay_for_retry(0), None);
    }

    #[test]
    fn test_retry_policy_exponential_capped() {
        let policy = RetryPolicy::exponential_backoff(
            5,
            Duration::from_millis(100),
            Duration::from_secs(1),
            2,
        )
        .unwrap_or_default();
        assert_eq!(policy.delay_for_retry(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_retry(3), Some(Duration::from_millis(800)));
        assert_eq!(policy.delay_for_retry(4), Some(Duration::from_secs(1)));
        // huge exponents saturate at the cap instead of overflowing
        assert_eq!(policy.delay_for_retry(200), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_retry_policy_sub_millisecond_base() {
        let policy = RetryPolicy::exponential(3, Duration::from_micros(500));
        assert_eq!(policy.delay_for_retry(0), Some(Duration::from_micros(500)));
        assert_eq!(policy.delay_for_retry(1), Some(Duration::from_millis(1)));
        assert_eq!(policy.delay_for_retry(2), Some(Duration::from_millis(2)));
    }

    #[test]
    fn test_retry_policy_validation() {
        let zero = RetryPolicy::exponential_backoff(
            0,
            Duration::from_millis(100),
            Duration::from_secs(10),
            2,
        );
        assert_eq!(zero, Err(RetryPolicyError("max_attempts must be at least 1")));

        let result = RetryPolicy::exponential_backoff(
            3,
            Duration::from_millis(100),
            Duration::from_secs(10),
            0,
        );
        assert!(result.is_err());

        let result = RetryPolicy::exponential_backoff(
            3,
            Duration::from_secs(10),
            Duration::from_millis(100),
            2,
        );
        assert_eq!(
            result.map_err(|e| e.to_string()),
            Err("max_delay must be >= initial_delay".to_string())
        );
    }
}
