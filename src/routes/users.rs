use axum::extract::{Path, Query, State};
use axum::Json;
use garde::Validate;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::db::queries;
use crate::error::ApiError;
use crate::models::user::{CreateUserRequest, User, UserDetailResponse, UserListResponse};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;
const RECENT_ANALYSES: i64 = 10;

/// POST /users — create a user. Duplicate username/email is a conflict.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, ApiError> {
    req.validate()
        .map_err(|report| ApiError::Validation(report.to_string()))?;

    let user = queries::create_user(&state.db, &req.username, req.email.as_deref()).await?;
    tracing::info!(user_id = user.id, username = %user.username, "user created");
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /users — paginated listing.
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<UserListResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let users = queries::list_users(&state.db, limit, offset).await?;
    let count = queries::count_users(&state.db).await?;

    Ok(Json(UserListResponse { count, users }))
}

/// GET /users/{user_id} — user plus their recent analyses and stats.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserDetailResponse>, ApiError> {
    let user = queries::get_user(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {user_id}")))?;

    let recent_analyses =
        queries::recent_analyses_for_user(&state.db, user_id, RECENT_ANALYSES).await?;
    let stats = queries::analysis_stats(&state.db, Some(user_id)).await?;

    Ok(Json(UserDetailResponse {
        user,
        recent_analyses,
        stats,
    }))
}

/// DELETE /users/{user_id} — remove a user; their analyses are kept with a
/// nulled user reference.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = queries::delete_user(&state.db, user_id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("user {user_id}")));
    }
    Ok(Json(serde_json::json!({
        "deleted": true,
        "user_id": user_id,
    })))
}
