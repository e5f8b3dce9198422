use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::error::ApiError;
use crate::models::analysis::{Analysis, AnalysisListResponse, AnalysisStats, AnalysisStatus};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub user_id: Option<i64>,
    pub status: Option<AnalysisStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /analyses — list analyses with optional filters, newest first.
pub async fn list_analyses(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<AnalysisListResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let analyses =
        queries::list_analyses(&state.db, params.user_id, params.status, limit, offset).await?;
    let count = queries::count_analyses(&state.db, params.user_id, params.status).await?;

    Ok(Json(AnalysisListResponse { count, analyses }))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub user_id: Option<i64>,
}

/// GET /analyses/stats — aggregate counters, optionally per user.
pub async fn analysis_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<AnalysisStats>, ApiError> {
    let stats = queries::analysis_stats(&state.db, params.user_id).await?;
    Ok(Json(stats))
}

/// GET /analyses/{task_id} — durable record, available after the queue's own
/// result has expired.
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Analysis>, ApiError> {
    let record = queries::get_analysis_by_task_id(&state.db, &task_id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("analysis {task_id}")))?;
    Ok(Json(record))
}

/// DELETE /analyses/{task_id} — remove a record from history.
pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = queries::delete_analysis(&state.db, &task_id.to_string()).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("analysis {task_id}")));
    }
    Ok(Json(serde_json::json!({
        "deleted": true,
        "task_id": task_id,
    })))
}
