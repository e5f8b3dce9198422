//! Worker-side job handling: outcome classification, retry/backoff policy,
//! and state synchronization into both the queue's result channel and the
//! persistent store.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::app_state::AppState;
use crate::db::{queries, StoreError};
use crate::models::analysis::AnalysisStatus;
use crate::services::documents;
use crate::services::pipeline::{AnalysisPipeline, PipelineError};
use crate::services::queue::{Delivery, QueueError, QueuedJob, TaskState};

pub use crate::services::queue::MAX_RETRIES;

/// Base backoff delay in seconds; doubles per retry (60, 120, 240).
pub const BASE_RETRY_DELAY_SECS: u64 = 60;

/// Terminal-or-retry result of one job attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Retry { delay_secs: u64 },
    Failure(String),
}

/// Exponential backoff: `base * 2^retry_count`.
pub fn backoff_delay(retry_count: u32) -> u64 {
    BASE_RETRY_DELAY_SECS * 2u64.pow(retry_count)
}

/// Recognize the upstream rate-limit signature in an error message:
/// a 429 status code, or a "RateLimitError"/"rate limit" marker.
pub fn is_rate_limited(error_text: &str) -> bool {
    let lower = error_text.to_ascii_lowercase();
    lower.contains("429") || lower.contains("ratelimit") || lower.contains("rate limit")
}

/// Classify a pipeline failure into retry or terminal failure.
///
/// Rate-limit errors retry with exponential backoff until the retry bound;
/// at the bound the retry itself fails terminally. Everything else fails
/// terminally on the first occurrence.
pub fn classify_failure(error_text: &str, retry_count: u32) -> Outcome {
    if is_rate_limited(error_text) {
        if retry_count < MAX_RETRIES {
            Outcome::Retry {
                delay_secs: backoff_delay(retry_count),
            }
        } else {
            Outcome::Failure(format!(
                "rate limited after {MAX_RETRIES} retries: {error_text}"
            ))
        }
    } else {
        Outcome::Failure(error_text.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Delete the transient document once its job reaches a terminal outcome.
/// On the retry path the file is kept so the redelivered attempt can
/// re-read it.
pub async fn cleanup_transient(job: &QueuedJob, outcome: &Outcome) {
    match outcome {
        Outcome::Success(_) | Outcome::Failure(_) => {
            documents::remove_transient(&job.file_path).await;
        }
        Outcome::Retry { .. } => {}
    }
}

/// Process one delivery end to end: run the analysis pipeline, classify the
/// result, and synchronize state into the queue's result channel and the
/// store.
pub async fn process_delivery(state: &AppState, delivery: &Delivery) -> Result<Outcome, JobError> {
    let pipeline = AnalysisPipeline::new(state.llm.clone(), state.tools.clone());
    process_with(state, delivery, move |file_path, query| async move {
        pipeline.run(&file_path, &query).await
    })
    .await
}

/// [`process_delivery`] with the pipeline invocation injected, so the
/// surrounding state machine is testable without an upstream model.
///
/// Every status-sync here is idempotent; at-least-once delivery may replay
/// this whole function for a task that already reached a terminal state, and
/// the store update will be a no-op.
pub async fn process_with<F, Fut>(
    state: &AppState,
    delivery: &Delivery,
    run: F,
) -> Result<Outcome, JobError>
where
    F: FnOnce(String, String) -> Fut,
    Fut: Future<Output = Result<String, PipelineError>>,
{
    let job = &delivery.job;
    let task_id = job.task_id;
    let task_id_str = task_id.to_string();

    state
        .queue
        .set_state(
            task_id,
            &TaskState::Processing {
                message: "Running analysis pipeline...".to_string(),
            },
        )
        .await?;
    queries::update_analysis_status(
        &state.db,
        &task_id_str,
        AnalysisStatus::Processing,
        None,
        None,
    )
    .await?;

    let started = Instant::now();
    let result = run(job.file_path.clone(), job.query.clone()).await;
    metrics::histogram!("analysis_processing_seconds").record(started.elapsed().as_secs_f64());

    let outcome = match result {
        Ok(report) => Outcome::Success(report),
        Err(e) => classify_failure(&e.to_string(), job.retry_count),
    };

    match &outcome {
        Outcome::Success(report) => {
            queries::update_analysis_status(
                &state.db,
                &task_id_str,
                AnalysisStatus::Success,
                Some(report),
                None,
            )
            .await?;
            state
                .queue
                .set_state(
                    task_id,
                    &TaskState::Success {
                        query: job.query.clone(),
                        analysis: report.clone(),
                        file_path: job.file_path.clone(),
                    },
                )
                .await?;
            metrics::counter!("analysis_jobs_completed").increment(1);
        }
        Outcome::Retry { delay_secs } => {
            let message = format!("Rate limited. Retrying in {delay_secs}s...");
            queries::update_analysis_status(
                &state.db,
                &task_id_str,
                AnalysisStatus::Retrying,
                None,
                None,
            )
            .await?;
            state
                .queue
                .set_state(task_id, &TaskState::Retrying { message })
                .await?;
            state
                .queue
                .schedule_retry(job, Duration::from_secs(*delay_secs))
                .await?;
            metrics::counter!("analysis_jobs_retried").increment(1);
        }
        Outcome::Failure(error) => {
            queries::update_analysis_status(
                &state.db,
                &task_id_str,
                AnalysisStatus::Failed,
                None,
                Some(error),
            )
            .await?;
            state
                .queue
                .set_state(
                    task_id,
                    &TaskState::Failure {
                        error: error.clone(),
                    },
                )
                .await?;
            metrics::counter!("analysis_jobs_failed").increment(1);
        }
    }

    cleanup_transient(job, &outcome).await;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_retry() {
        assert_eq!(backoff_delay(0), 60);
        assert_eq!(backoff_delay(1), 120);
        assert_eq!(backoff_delay(2), 240);
    }

    #[test]
    fn test_rate_limit_signature_detection() {
        assert!(is_rate_limited("upstream returned 429: quota exceeded"));
        assert!(is_rate_limited("RateLimitError: too many requests"));
        assert!(is_rate_limited("ratelimiterror from upstream"));
        assert!(is_rate_limited("Rate limit reached for model"));
        assert!(!is_rate_limited("failed to read document at data/x.pdf"));
        assert!(!is_rate_limited("upstream returned 500: internal"));
    }

    #[test]
    fn test_rate_limit_retries_with_growing_countdown() {
        // A pipeline that always rate-limits is retried exactly MAX_RETRIES
        // times with countdowns 60, 120, 240, then fails terminally.
        let err = "upstream returned 429: quota exceeded";
        let mut delays = Vec::new();
        for retry_count in 0.. {
            match classify_failure(err, retry_count) {
                Outcome::Retry { delay_secs } => delays.push(delay_secs),
                Outcome::Failure(msg) => {
                    assert!(msg.contains("rate limited after 3 retries"));
                    break;
                }
                Outcome::Success(_) => unreachable!(),
            }
        }
        assert_eq!(delays, [60, 120, 240]);
    }

    #[test]
    fn test_non_rate_limit_errors_fail_without_retry() {
        let outcome = classify_failure("empty completion from model", 0);
        assert_eq!(
            outcome,
            Outcome::Failure("empty completion from model".to_string())
        );
    }

    async fn transient_job() -> (QueuedJob, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "financial_document_{}.pdf",
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&path, b"document bytes").await.unwrap();
        let job = QueuedJob {
            task_id: uuid::Uuid::new_v4(),
            query: "test query".to_string(),
            file_path: path.display().to_string(),
            retry_count: 0,
        };
        (job, path)
    }

    #[tokio::test]
    async fn test_cleanup_removes_document_on_terminal_outcomes() {
        let (job, path) = transient_job().await;
        cleanup_transient(&job, &Outcome::Success("OK".to_string())).await;
        assert!(!path.exists());

        let (job, path) = transient_job().await;
        cleanup_transient(&job, &Outcome::Failure("boom".to_string())).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_document_across_retry() {
        // The redelivered attempt must be able to re-read the file.
        let (job, path) = transient_job().await;
        cleanup_transient(&job, &Outcome::Retry { delay_secs: 60 }).await;
        assert!(path.exists());
        tokio::fs::remove_file(&path).await.ok();
    }
}
