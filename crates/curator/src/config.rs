//! Pipeline configuration.
//!
//! Values come from JSON or from `CURATOR_*` environment variables and turn
//! into the [`StepDefaults`] applied to steps that leave a setting open.

use crate::definition::StepDefaults;
use curator_core::{FailurePolicy, RetryPolicy, RetryPolicyError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const ENV_MAX_ATTEMPTS: &str = "CURATOR_MAX_ATTEMPTS";
const ENV_BACKOFF_BASE_MS: &str = "CURATOR_BACKOFF_BASE_MS";
const ENV_BACKOFF_CAP_MS: &str = "CURATOR_BACKOFF_CAP_MS";
const ENV_CONTINUE_ON_FAILURE: &str = "CURATOR_CONTINUE_ON_FAILURE";
const ENV_STEP_TIMEOUT_SECS: &str = "CURATOR_STEP_TIMEOUT_SECS";
const ENV_ATTEMPT_TIMEOUT_SECS: &str = "CURATOR_ATTEMPT_TIMEOUT_SECS";

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    RetryPolicy(#[from] RetryPolicyError),
}

/// Tunables shared by every step of a pipeline.
///
/// # Examples
///
/// ```
/// use curator::PipelineConfig;
///
/// let config = PipelineConfig::from_json(r#"{ "max_attempts": 5, "continue_on_failure": true }"#).unwrap();
/// assert_eq!(config.max_attempts, 5);
/// assert_eq!(config.backoff_base_ms, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Failed steps degrade the run instead of aborting it.
    pub continue_on_failure: bool,
    pub step_timeout_secs: Option<u64>,
    pub attempt_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 5_000,
            backoff_cap_ms: 60_000,
            continue_on_failure: false,
            step_timeout_secs: None,
            attempt_timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `CURATOR_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Builds a config from key/value pairs. Unknown keys are ignored and
    /// missing keys keep their defaults.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                ENV_MAX_ATTEMPTS => config.max_attempts = parse(key, value)?,
                ENV_BACKOFF_BASE_MS => config.backoff_base_ms = parse(key, value)?,
                ENV_BACKOFF_CAP_MS => config.backoff_cap_ms = parse(key, value)?,
                ENV_CONTINUE_ON_FAILURE => config.continue_on_failure = parse_flag(key, value)?,
                ENV_STEP_TIMEOUT_SECS => config.step_timeout_secs = Some(parse(key, value)?),
                ENV_ATTEMPT_TIMEOUT_SECS => {
                    config.attempt_timeout_secs = Some(parse(key, value)?)
                }
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff_cap_ms ({}) is below backoff_base_ms ({})",
                self.backoff_cap_ms, self.backoff_base_ms
            )));
        }
        if self.step_timeout_secs == Some(0) || self.attempt_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    /// Exponential backoff doubling from the base delay up to the cap.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::exponential_backoff(
            self.max_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
            2,
        )?)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        if self.continue_on_failure {
            FailurePolicy::ContinueDegraded
        } else {
            FailurePolicy::AbortWorkflow
        }
    }

    pub fn step_defaults(&self) -> Result<StepDefaults, ConfigError> {
        self.validate()?;
        Ok(StepDefaults {
            retry_policy: self.retry_policy()?,
            failure_policy: self.failure_policy(),
            timeout: self.step_timeout_secs.map(Duration::from_secs),
            attempt_timeout: self.attempt_timeout_secs.map(Duration::from_secs),
        })
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        let defaults = config.step_defaults().unwrap();

        assert_eq!(defaults.retry_policy.max_attempts(), 3);
        assert_eq!(
            defaults.retry_policy.delay_for_retry(0),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            defaults.retry_policy.delay_for_retry(1),
            Some(Duration::from_secs(10))
        );
        assert_eq!(defaults.failure_policy, FailurePolicy::AbortWorkflow);
        assert_eq!(defaults.timeout, None);
    }

    #[test]
    fn test_from_json_partial() {
        let config = PipelineConfig::from_json(
            r#"{ "backoff_base_ms": 100, "continue_on_failure": true, "step_timeout_secs": 30 }"#,
        )
        .unwrap();

        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_base_ms, 100);
        assert_eq!(config.failure_policy(), FailurePolicy::ContinueDegraded);
        assert_eq!(
            config.step_defaults().unwrap().timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_from_json_malformed() {
        let err = PipelineConfig::from_json("{ max_attempts: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_vars() {
        let config = PipelineConfig::from_vars([
            ("CURATOR_MAX_ATTEMPTS", "5"),
            ("CURATOR_CONTINUE_ON_FAILURE", "yes"),
            ("CURATOR_ATTEMPT_TIMEOUT_SECS", " 20 "),
            ("PATH", "/usr/bin"),
        ])
        .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert!(config.continue_on_failure);
        assert_eq!(config.attempt_timeout_secs, Some(20));
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        let err = PipelineConfig::from_vars([("CURATOR_MAX_ATTEMPTS", "three")]).unwrap_err();
        assert!(err.to_string().contains("CURATOR_MAX_ATTEMPTS"));

        let err = PipelineConfig::from_vars([("CURATOR_CONTINUE_ON_FAILURE", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validation() {
        let zero = PipelineConfig {
            max_attempts: 0,
            ..PipelineConfig::default()
        };
        assert!(zero.validate().is_err());

        let inverted = PipelineConfig {
            backoff_base_ms: 10_000,
            backoff_cap_ms: 1_000,
            ..PipelineConfig::default()
        };
        assert!(matches!(inverted.validate(), Err(ConfigError::Invalid(_))));
    }
}
