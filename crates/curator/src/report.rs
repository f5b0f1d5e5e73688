//! The immutable result of a finished run.

use crate::state::TerminalStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use curator_core::{
    Artifacts, FailurePolicy, StepError, StepName, StepOutcome, StepStatus, WorkerName,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;

/// Per-step line of a [`WorkflowReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step_name: StepName,
    pub status: StepStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub duration_ms: u64,
    pub policy: FailurePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_workers: Vec<WorkerName>,
}

impl From<&StepOutcome> for StepReport {
    fn from(outcome: &StepOutcome) -> Self {
        Self {
            step_name: outcome.step.clone(),
            status: outcome.status,
            attempts: outcome.attempts,
            max_attempts: outcome.max_attempts,
            duration_ms: millis(outcome.elapsed),
            policy: outcome.policy,
            error: outcome.error.clone(),
            failed_workers: outcome.failed_workers().cloned().collect(),
        }
    }
}

/// Step counts of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_steps: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_attempted: usize,
    /// Percentage of declared steps that succeeded.
    pub success_rate: f64,
}

/// Snapshot of a terminal run.
///
/// Steps appear in execution order, which is the declared order truncated at
/// the abort point. Steps after an abort are listed in `not_attempted`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    run_id: String,
    status: TerminalStatus,
    started_at: DateTime<Utc>,
    steps: Vec<StepReport>,
    not_attempted: Vec<StepName>,
    overall_success: bool,
    total_duration_ms: u64,
    artifacts: Artifacts,
    #[serde(skip)]
    outcomes: Vec<StepOutcome>,
}

impl WorkflowReport {
    pub(crate) fn new(
        run_id: String,
        status: TerminalStatus,
        started_at: DateTime<Utc>,
        outcomes: Vec<StepOutcome>,
        not_attempted: Vec<StepName>,
        artifacts: Artifacts,
        elapsed: Duration,
    ) -> Self {
        let overall_success =
            status == TerminalStatus::Completed && outcomes.iter().all(StepOutcome::succeeded);
        Self {
            run_id,
            status,
            started_at,
            steps: outcomes.iter().map(StepReport::from).collect(),
            not_attempted,
            overall_success,
            total_duration_ms: millis(elapsed),
            artifacts,
            outcomes,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn status(&self) -> TerminalStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    /// Full outcomes, attempt records included.
    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn not_attempted(&self) -> &[StepName] {
        &self.not_attempted
    }

    /// True only if the run completed and every recorded step succeeded.
    pub fn overall_success(&self) -> bool {
        self.overall_success
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    pub fn summary(&self) -> ReportSummary {
        let count = |status: StepStatus| self.steps.iter().filter(|s| s.status == status).count();
        let succeeded = count(StepStatus::Succeeded);
        let total_steps = self.steps.len() + self.not_attempted.len();
        let success_rate = if total_steps == 0 {
            0.0
        } else {
            succeeded as f64 / total_steps as f64 * 100.0
        };
        ReportSummary {
            total_steps,
            succeeded,
            failed: count(StepStatus::Failed),
            skipped: count(StepStatus::Skipped),
            not_attempted: self.not_attempted.len(),
            success_rate,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable rendering for logs and run archives.
    pub fn to_markdown(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(out, "# Workflow Execution Report");
        let _ = writeln!(out, "**Run ID:** {}", self.run_id);
        let _ = writeln!(out, "**Status:** {}", self.status.to_string().to_uppercase());
        let _ = writeln!(
            out,
            "**Overall success:** {}",
            if self.overall_success { "yes" } else { "no" }
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "## Timing");
        let _ = writeln!(
            out,
            "- **Started:** {}",
            self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(
            out,
            "- **Duration:** {:.2} seconds",
            self.total_duration_ms as f64 / 1000.0
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "## Summary");
        let _ = writeln!(out, "- **Total Steps:** {}", summary.total_steps);
        let _ = writeln!(out, "- **Succeeded:** {}", summary.succeeded);
        let _ = writeln!(out, "- **Failed:** {}", summary.failed);
        let _ = writeln!(out, "- **Skipped:** {}", summary.skipped);
        let _ = writeln!(out, "- **Not attempted:** {}", summary.not_attempted);
        let _ = writeln!(out, "- **Success Rate:** {:.1}%", summary.success_rate);
        let _ = writeln!(out);

        let _ = writeln!(out, "## Step Details");
        for step in &self.steps {
            let _ = writeln!(out);
            let _ = writeln!(out, "### {}", title(step.step_name.as_str()));
            let _ = writeln!(out, "- **Status:** {}", step.status);
            let _ = writeln!(out, "- **Attempts:** {}/{}", step.attempts, step.max_attempts);
            let _ = writeln!(out, "- **Duration:** {} ms", step.duration_ms);
            if let Some(error) = &step.error {
                let _ = writeln!(out, "- **Error:** {}", error);
            }
        }
        for name in &self.not_attempted {
            let _ = writeln!(out);
            let _ = writeln!(out, "### {}", title(name.as_str()));
            let _ = writeln!(out, "- **Status:** not attempted");
        }

        let errors: Vec<&StepReport> = self.steps.iter().filter(|s| s.error.is_some()).collect();
        if !errors.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Errors Encountered");
            let _ = writeln!(out);
            for (i, step) in errors.iter().enumerate() {
                if let Some(error) = &step.error {
                    let _ = writeln!(out, "{}. **{}:** {}", i + 1, step.step_name, error);
                }
            }
        }

        out
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `news_gathering` -> `News Gathering`
fn title(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_core::{Payload, ResultStatus, StepResult, SubtaskOutcome};

    fn outcome(step: &str, status: StepStatus, error: Option<StepError>) -> StepOutcome {
        StepOutcome {
            step: StepName::new(step),
            position: 0,
            policy: FailurePolicy::ContinueDegraded,
            status,
            attempts: if status == StepStatus::Skipped { 0 } else { 2 },
            max_attempts: 3,
            subtasks: Vec::new(),
            payload: Payload::new(),
            error,
            elapsed: Duration::from_millis(1500),
        }
    }

    fn report(outcomes: Vec<StepOutcome>, not_attempted: &[&str], status: TerminalStatus) -> WorkflowReport {
        let mut artifacts = Artifacts::new();
        artifacts.insert(StepName::new("news"), Payload::new().with("articles", 4));
        WorkflowReport::new(
            "workflow_test".to_string(),
            status,
            Utc::now(),
            outcomes,
            not_attempted.iter().map(|n| StepName::new(*n)).collect(),
            artifacts,
            Duration::from_secs(3),
        )
    }

    #[test]
    fn test_summary_counts() {
        let report = report(
            vec![
                outcome("news", StepStatus::Succeeded, None),
                outcome("social", StepStatus::Failed, Some(StepError::retryable("429"))),
                outcome("content", StepStatus::Skipped, Some(StepError::fatal("no input"))),
            ],
            &["compile"],
            TerminalStatus::Aborted,
        );

        let summary = report.summary();
        assert_eq!(summary.total_steps, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.not_attempted, 1);
        assert!((summary.success_rate - 25.0).abs() < f64::EPSILON);
        assert!(!report.overall_success());
    }

    #[test]
    fn test_degraded_completion_is_not_overall_success() {
        let report = report(
            vec![
                outcome("news", StepStatus::Failed, Some(StepError::fatal("down"))),
                outcome("social", StepStatus::Succeeded, None),
            ],
            &[],
            TerminalStatus::Completed,
        );
        assert_eq!(report.status(), TerminalStatus::Completed);
        assert!(!report.overall_success());
    }

    #[test]
    fn test_json_shape() {
        let mut failed = outcome("social", StepStatus::Failed, Some(StepError::retryable("429")));
        failed.subtasks.push(SubtaskOutcome {
            worker: WorkerName::new("linkedin"),
            result: StepResult {
                status: ResultStatus::Error,
                payload: None,
                error: Some(StepError::retryable("429")),
                duration: Duration::ZERO,
            },
            attempts: Vec::new(),
        });
        let report = report(
            vec![outcome("news", StepStatus::Succeeded, None), failed],
            &[],
            TerminalStatus::Completed,
        );

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["runId"], "workflow_test");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["overallSuccess"], false);
        assert_eq!(json["totalDurationMs"], 3000);
        assert_eq!(json["steps"][0]["stepName"], "news");
        assert_eq!(json["steps"][0]["durationMs"], 1500);
        assert!(json["steps"][0].get("error").is_none());
        assert_eq!(json["steps"][1]["status"], "failed");
        assert_eq!(json["steps"][1]["policy"], "continue-degraded");
        assert_eq!(json["steps"][1]["failedWorkers"][0], "linkedin");
        assert_eq!(json["steps"][1]["error"]["kind"], "retryable");
        assert_eq!(json["artifacts"]["news"]["articles"], 4);
        assert!(json.get("outcomes").is_none());
    }

    #[test]
    fn test_markdown_lists_steps_and_errors() {
        let report = report(
            vec![outcome(
                "news_gathering",
                StepStatus::Failed,
                Some(StepError::fatal("invalid_api_key")),
            )],
            &["content_generation"],
            TerminalStatus::Aborted,
        );

        let markdown = report.to_markdown();
        assert!(markdown.contains("**Status:** ABORTED"));
        assert!(markdown.contains("### News Gathering"));
        assert!(markdown.contains("- **Attempts:** 2/3"));
        assert!(markdown.contains("### Content Generation\n- **Status:** not attempted"));
        assert!(markdown.contains("## Errors Encountered"));
        assert!(markdown.contains("1. **news_gathering:** fatal: invalid_api_key"));
    }

    #[test]
    fn test_title() {
        assert_eq!(title("social_media_monitoring"), "Social Media Monitoring");
        assert_eq!(title("compile"), "Compile");
    }
}
