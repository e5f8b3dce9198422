use axum::extract::{Multipart, Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::error::ApiError;
use crate::models::analysis::{AnalysisStatus, SubmitResponse, TaskStatusResponse};
use crate::services::queue::TaskState;

const DEFAULT_QUERY: &str = "Analyze this financial document for investment insights";

/// GET / — liveness payload.
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Financial Document Analyzer API is running"
    }))
}

/// POST /analyze — submit a financial document for analysis.
///
/// Persists the upload to a transient file, enqueues the job, and records it
/// in the store with status `queued`. If anything fails after the file is
/// written, the file is removed (best effort) and the caller gets a generic
/// submission error.
pub async fn submit_analysis(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename = String::from("document.pdf");
    let mut query = String::new();
    let mut user_id: Option<i64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                if let Some(name) = field.file_name() {
                    filename = name.to_string();
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("failed to read file field: {e}")))?;
                file_bytes = Some(data.to_vec());
            }
            Some("query") => {
                query = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(format!("failed to read query field: {e}")))?;
            }
            Some("user_id") => {
                let raw = field.text().await.map_err(|e| {
                    ApiError::Validation(format!("failed to read user_id field: {e}"))
                })?;
                let parsed = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ApiError::Validation(format!("invalid user_id: {raw}")))?;
                user_id = Some(parsed);
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| ApiError::Validation("missing file field".into()))?;

    // Referenced user must exist before anything is written.
    if let Some(uid) = user_id {
        queries::get_user(&state.db, uid)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("user {uid}")))?;
    }

    let query = match query.trim() {
        "" => DEFAULT_QUERY.to_string(),
        trimmed => trimmed.to_string(),
    };
    let file_size = file_bytes.len() as i64;

    let file_path = state
        .documents
        .save(&file_bytes)
        .await
        .map_err(|e| ApiError::Submission(e.to_string()))?;

    let submitted: Result<(Uuid, i64), ApiError> = async {
        let task_id = state
            .queue
            .enqueue(&query, &file_path.to_string_lossy())
            .await
            .map_err(|e| ApiError::Submission(e.to_string()))?;
        let record = queries::create_analysis(
            &state.db,
            &task_id.to_string(),
            user_id,
            &filename,
            file_size,
            &query,
        )
        .await
        .map_err(|e| ApiError::Submission(e.to_string()))?;
        Ok((task_id, record.id))
    }
    .await;

    match submitted {
        Ok((task_id, analysis_id)) => {
            metrics::counter!("analysis_jobs_total").increment(1);
            tracing::info!(task_id = %task_id, analysis_id, file_size, "document submitted for analysis");
            Ok(Json(SubmitResponse {
                status: "queued",
                task_id,
                analysis_id,
                message: "Document submitted for analysis. Poll /status/{task_id} for results.",
            }))
        }
        Err(e) => {
            state.documents.remove(&file_path).await;
            Err(e)
        }
    }
}

/// GET /status/{task_id} — live status from the queue.
///
/// As a side effect, the observed state (except pending) is written through
/// to the store; the write-through and the worker's own syncs may race, but
/// both are idempotent and coalescing, so the store converges regardless.
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task_state = state
        .queue
        .get_state(task_id)
        .await?
        .unwrap_or(TaskState::Pending);

    let response = match task_state {
        TaskState::Pending => TaskStatusResponse {
            task_id,
            status: "pending".to_string(),
            message: Some("Task is waiting in queue.".to_string()),
            query: None,
            analysis: None,
            error: None,
        },
        TaskState::Processing { message } => {
            reconcile(&state, task_id, AnalysisStatus::Processing, None, None).await;
            TaskStatusResponse {
                task_id,
                status: "processing".to_string(),
                message: Some(message),
                query: None,
                analysis: None,
                error: None,
            }
        }
        TaskState::Retrying { message } => {
            reconcile(&state, task_id, AnalysisStatus::Retrying, None, None).await;
            TaskStatusResponse {
                task_id,
                status: "retrying".to_string(),
                message: Some(message),
                query: None,
                analysis: None,
                error: None,
            }
        }
        TaskState::Success {
            query, analysis, ..
        } => {
            reconcile(&state, task_id, AnalysisStatus::Success, Some(&analysis), None).await;
            TaskStatusResponse {
                task_id,
                status: "success".to_string(),
                message: None,
                query: Some(query),
                analysis: Some(analysis),
                error: None,
            }
        }
        TaskState::Failure { error } => {
            reconcile(&state, task_id, AnalysisStatus::Failed, None, Some(&error)).await;
            TaskStatusResponse {
                task_id,
                status: "failed".to_string(),
                message: None,
                query: None,
                analysis: None,
                error: Some(error),
            }
        }
    };

    Ok(Json(response))
}

/// Write-through of a queue-observed state into the store. Best effort: the
/// poll response reflects the queue either way, and the worker's own syncs
/// keep the store converging.
async fn reconcile(
    state: &AppState,
    task_id: Uuid,
    status: AnalysisStatus,
    analysis: Option<&str>,
    error: Option<&str>,
) {
    if let Err(e) = queries::update_analysis_status(
        &state.db,
        &task_id.to_string(),
        status,
        analysis,
        error,
    )
    .await
    {
        tracing::warn!(task_id = %task_id, error = %e, "status reconciliation write failed");
    }
}
