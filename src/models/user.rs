use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::analysis::{Analysis, AnalysisStats};

/// An identity record. Never mutated after creation; deleting a user orphans
/// its analyses (their `user_id` becomes null) rather than cascading.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a user.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[garde(length(min = 1, max = 100))]
    pub username: String,

    #[garde(inner(email))]
    pub email: Option<String>,
}

/// Paginated listing of users.
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub count: i64,
    pub users: Vec<User>,
}

/// User detail view: the user plus their most recent analyses and stats.
#[derive(Debug, Serialize)]
pub struct UserDetailResponse {
    #[serde(flatten)]
    pub user: User,
    pub recent_analyses: Vec<Analysis>,
    pub stats: AnalysisStats,
}
