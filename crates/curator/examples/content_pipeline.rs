//! Content curation pipeline: news, social media, content, final output.
//!
//! This example demonstrates:
//! 1. A single-worker stage with retries (news gathering)
//! 2. A parallel stage, one worker per platform (social media monitoring)
//! 3. A stage that needs at least one upstream source (content generation)
//! 4. Compiling everything produced so far into a final output
//!
//! The LinkedIn worker is rate limited on its first call to show a retry.
//! Settings come from `CURATOR_*` environment variables, for example:
//!
//! ```sh
//! CURATOR_BACKOFF_BASE_MS=200 CURATOR_CONTINUE_ON_FAILURE=true \
//!     cargo run --example content_pipeline
//! ```

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use curator::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct CurationSettings {
    keywords: Vec<String>,
    days_back: i64,
    max_results: usize,
}

fn settings(input: &WorkerInput) -> Result<&CurationSettings, StepError> {
    input
        .context()
        .get::<CurationSettings>("settings")
        .ok_or_else(|| StepError::fatal("curation settings missing from context"))
}

#[derive(Debug)]
struct NewsGatherer;

#[async_trait]
impl Worker for NewsGatherer {
    async fn execute(&self, input: &WorkerInput) -> Result<Payload, StepError> {
        let settings = settings(input)?;
        let since = (Utc::now() - ChronoDuration::days(settings.days_back)).date_naive();

        // In production this would query a search API.
        let articles: Vec<_> = settings
            .keywords
            .iter()
            .take(settings.max_results)
            .enumerate()
            .map(|(i, keyword)| {
                json!({
                    "title": format!("{} update #{}", keyword, i + 1),
                    "source": "oecd.ai",
                    "published_at": since.to_string(),
                })
            })
            .collect();

        Ok(Payload::new()
            .with("articles", articles.clone())
            .with("article_count", articles.len()))
    }

    fn name(&self) -> WorkerName {
        WorkerName::new("news_gatherer")
    }
}

#[derive(Debug)]
struct PlatformMonitor {
    platform: &'static str,
    posts: u32,
    rate_limited_calls: u32,
    calls: AtomicU32,
}

impl PlatformMonitor {
    fn new(platform: &'static str, posts: u32) -> Self {
        Self {
            platform,
            posts,
            rate_limited_calls: 0,
            calls: AtomicU32::new(0),
        }
    }

    fn rate_limited(mut self, calls: u32) -> Self {
        self.rate_limited_calls = calls;
        self
    }
}

#[async_trait]
impl Worker for PlatformMonitor {
    async fn execute(&self, _input: &WorkerInput) -> Result<Payload, StepError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.rate_limited_calls {
            return Err(StepError::from_message(format!(
                "{} returned 429 Too Many Requests",
                self.platform
            )));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(Payload::new().with(format!("{}_posts", self.platform), self.posts))
    }

    fn name(&self) -> WorkerName {
        WorkerName::new(self.platform)
    }
}

#[derive(Debug)]
struct ContentGenerator;

#[async_trait]
impl Worker for ContentGenerator {
    async fn execute(&self, input: &WorkerInput) -> Result<Payload, StepError> {
        let sources = input.upstream().merged();
        let articles = sources
            .get("article_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let posts: u64 = sources
            .iter()
            .filter(|(key, _)| key.ends_with("_posts"))
            .filter_map(|(_, value)| value.as_u64())
            .sum();

        Ok(Payload::new()
            .with(
                "blog_post",
                format!("Weekly digest built from {} articles and {} posts", articles, posts),
            )
            .with("social_posts", json!(["x", "linkedin", "facebook"])))
    }

    fn name(&self) -> WorkerName {
        WorkerName::new("content_generator")
    }
}

#[derive(Debug)]
struct OutputCompiler;

#[async_trait]
impl Worker for OutputCompiler {
    async fn execute(&self, input: &WorkerInput) -> Result<Payload, StepError> {
        let sections: Vec<String> = input
            .upstream()
            .iter()
            .map(|(step, payload)| format!("{} ({} fields)", step, payload.len()))
            .collect();
        Ok(Payload::new()
            .with("compiled_sections", sections)
            .with("compiled_at", Utc::now().to_rfc3339()))
    }

    fn name(&self) -> WorkerName {
        WorkerName::new("output_compiler")
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = PipelineConfig::from_env()?;
    let context = Context::builder()
        .insert(
            "settings",
            CurationSettings {
                keywords: vec![
                    "AI policy".to_string(),
                    "AI regulation".to_string(),
                    "responsible AI".to_string(),
                ],
                days_back: 14,
                max_results: 5,
            },
        )
        .build();

    let workflow = Workflow::builder()
        .defaults(config.step_defaults()?)
        .step(
            StepDefinition::new("news_gathering")
                .describe("Gather latest news articles and events")
                .worker(NewsGatherer)
                .on_failure(FailurePolicy::ContinueDegraded),
        )
        .step(
            StepDefinition::new("social_media_monitoring")
                .describe("Monitor social media accounts for relevant posts")
                .worker(PlatformMonitor::new("x", 12))
                .worker(PlatformMonitor::new("linkedin", 4).rate_limited(1))
                .worker(PlatformMonitor::new("facebook", 7))
                .on_failure(FailurePolicy::ContinueDegraded),
        )
        .step(
            StepDefinition::new("content_generation")
                .describe("Generate publication-ready content")
                .worker(ContentGenerator)
                .requires(InputRequirement::AnyOf(vec![
                    "news_gathering".into(),
                    "social_media_monitoring".into(),
                ])),
        )
        .step(
            StepDefinition::new("final_output")
                .describe("Compile and save final outputs")
                .worker(OutputCompiler)
                .retry(RetryPolicy::None),
        )
        .build()?;

    let report = workflow.run(&context).await;

    println!("{}", report.to_markdown());
    println!("{}", report.to_json()?);

    let summary = report.summary();
    println!(
        "{}/{} steps succeeded ({:.1}%)",
        summary.succeeded, summary.total_steps, summary.success_rate
    );

    Ok(())
}
