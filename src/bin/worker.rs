use financial_analyzer::{
    app_state::AppState,
    config::AppConfig,
    db,
    jobs::{self, JobError, Outcome},
    services::{documents::DocumentStore, llm::GeminiClient, queue::TaskQueue, tools::ToolSet},
};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting financial analysis worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to SQLite store");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize services
    tracing::info!("Initializing services");
    let queue = TaskQueue::new(&config.redis_url, config.result_expires_secs)
        .expect("Failed to initialize job queue");
    let documents = DocumentStore::new(&config.upload_dir);
    let llm = GeminiClient::new(&config.gemini_api_key);
    let tools = ToolSet::new(config.serper_api_key.clone());

    let state = AppState::new(db_pool, queue, documents, llm, tools);

    tracing::info!("Worker ready, starting job processing loop");

    // Main processing loop: one job at a time per worker.
    loop {
        match process_next_job(&state).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job available.
async fn process_next_job(state: &AppState) -> Result<bool, JobError> {
    let delivery = match state.queue.dequeue().await? {
        Some(d) => d,
        None => return Ok(false),
    };

    let job = &delivery.job;
    tracing::info!(
        task_id = %job.task_id,
        retry_count = job.retry_count,
        query = %job.query,
        "Processing analysis job"
    );

    match jobs::process_delivery(state, &delivery).await {
        Ok(outcome) => {
            // Late ack: the job leaves the processing list only now.
            state.queue.ack(&delivery).await?;

            match outcome {
                Outcome::Success(_) => {
                    tracing::info!(task_id = %job.task_id, "Job completed successfully");
                }
                Outcome::Retry { delay_secs } => {
                    tracing::info!(
                        task_id = %job.task_id,
                        retry_count = job.retry_count,
                        delay_secs,
                        "Job re-queued for delayed retry"
                    );
                }
                Outcome::Failure(error) => {
                    tracing::warn!(task_id = %job.task_id, error = %error, "Job failed");
                }
            }
        }
        Err(e) => {
            // Store/queue sync failed mid-job: return the payload for
            // redelivery. The syncs are idempotent, so replaying is safe.
            tracing::error!(task_id = %job.task_id, error = %e, "State sync failed, re-queueing job");
            state.queue.requeue(&delivery).await?;
        }
    }

    if let Ok(depth) = state.queue.queue_depth().await {
        metrics::gauge!("analysis_queue_depth").set(depth as f64);
    }

    Ok(true)
}
