use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::StoreError;
use crate::models::analysis::{Analysis, AnalysisStats, AnalysisStatus};
use crate::models::user::User;

// ── Users ─────────────────────────────────────────────────────────────────────

/// Insert a new user. Duplicate username/email maps to a unique violation.
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    email: Option<&str>,
) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, created_at)
        VALUES (?1, ?2, ?3)
        RETURNING id, username, email, created_at
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_sqlx(e, "username or email already exists"))
}

pub async fn get_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>, StoreError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, created_at FROM users WHERE id = ?1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn list_users(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<User>, StoreError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, created_at
        FROM users
        ORDER BY created_at DESC, id DESC
        LIMIT ?1 OFFSET ?2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(users)
}

pub async fn count_users(pool: &SqlitePool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Delete a user. Analyses referencing them keep their rows with `user_id`
/// set to null by the foreign key's ON DELETE SET NULL.
pub async fn delete_user(pool: &SqlitePool, user_id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ── Analyses ──────────────────────────────────────────────────────────────────

/// Record a new analysis submission with status `queued`.
pub async fn create_analysis(
    pool: &SqlitePool,
    task_id: &str,
    user_id: Option<i64>,
    filename: &str,
    file_size: i64,
    query: &str,
) -> Result<Analysis, StoreError> {
    sqlx::query_as::<_, Analysis>(
        r#"
        INSERT INTO analyses (task_id, user_id, filename, file_size, query, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 'queued', ?6)
        RETURNING id, task_id, user_id, filename, file_size, query, status,
                  analysis, error, created_at, completed_at
        "#,
    )
    .bind(task_id)
    .bind(user_id)
    .bind(filename)
    .bind(file_size)
    .bind(query)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_sqlx(e, "task_id already exists"))
}

pub async fn get_analysis(
    pool: &SqlitePool,
    analysis_id: i64,
) -> Result<Option<Analysis>, StoreError> {
    let row = sqlx::query_as::<_, Analysis>(
        r#"
        SELECT id, task_id, user_id, filename, file_size, query, status,
               analysis, error, created_at, completed_at
        FROM analyses
        WHERE id = ?1
        "#,
    )
    .bind(analysis_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_analysis_by_task_id(
    pool: &SqlitePool,
    task_id: &str,
) -> Result<Option<Analysis>, StoreError> {
    let row = sqlx::query_as::<_, Analysis>(
        r#"
        SELECT id, task_id, user_id, filename, file_size, query, status,
               analysis, error, created_at, completed_at
        FROM analyses
        WHERE task_id = ?1
        "#,
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Coalescing partial status update, safe to repeat.
///
/// Unsupplied `analysis`/`error` fields keep their previous value.
/// `completed_at` is derived from the new status and set at most once, so a
/// repeated terminal sync never clobbers the original completion time. A row
/// already in a terminal status is frozen whole: neither its status nor its
/// `analysis`/`error` fields change, so a late replay carrying a different
/// terminal outcome cannot pollute the recorded one. The CASE conditions all
/// read the row's pre-update status.
pub async fn update_analysis_status(
    pool: &SqlitePool,
    task_id: &str,
    status: AnalysisStatus,
    analysis: Option<&str>,
    error: Option<&str>,
) -> Result<(), StoreError> {
    let completed_at = status.is_terminal().then(Utc::now);

    sqlx::query(
        r#"
        UPDATE analyses
        SET status = CASE WHEN status IN ('success', 'failed') THEN status ELSE ?1 END,
            analysis = CASE WHEN status IN ('success', 'failed') THEN analysis
                            ELSE COALESCE(?2, analysis) END,
            error = CASE WHEN status IN ('success', 'failed') THEN error
                         ELSE COALESCE(?3, error) END,
            completed_at = COALESCE(completed_at, ?4)
        WHERE task_id = ?5
        "#,
    )
    .bind(status)
    .bind(analysis)
    .bind(error)
    .bind(completed_at)
    .bind(task_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// List analyses, newest first, with optional user/status filters.
pub async fn list_analyses(
    pool: &SqlitePool,
    user_id: Option<i64>,
    status: Option<AnalysisStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Analysis>, StoreError> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, task_id, user_id, filename, file_size, query, status, \
         analysis, error, created_at, completed_at FROM analyses WHERE 1=1",
    );
    if let Some(uid) = user_id {
        qb.push(" AND user_id = ").push_bind(uid);
    }
    if let Some(st) = status {
        qb.push(" AND status = ").push_bind(st);
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build_query_as::<Analysis>().fetch_all(pool).await?;
    Ok(rows)
}

pub async fn count_analyses(
    pool: &SqlitePool,
    user_id: Option<i64>,
    status: Option<AnalysisStatus>,
) -> Result<i64, StoreError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM analyses WHERE 1=1");
    if let Some(uid) = user_id {
        qb.push(" AND user_id = ").push_bind(uid);
    }
    if let Some(st) = status {
        qb.push(" AND status = ").push_bind(st);
    }

    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}

/// Aggregate stats over the analyses table, optionally scoped to one user.
pub async fn analysis_stats(
    pool: &SqlitePool,
    user_id: Option<i64>,
) -> Result<AnalysisStats, StoreError> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0) AS succeeded,
               COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
               COALESCE(SUM(CASE WHEN status IN ('queued', 'processing', 'retrying') THEN 1 ELSE 0 END), 0) AS in_progress,
               COALESCE(SUM(file_size), 0) AS total_bytes_processed
        FROM analyses
        "#,
    );
    if let Some(uid) = user_id {
        qb.push(" WHERE user_id = ").push_bind(uid);
    }

    let stats = qb.build_query_as::<AnalysisStats>().fetch_one(pool).await?;
    Ok(stats)
}

/// The user's most recent analyses, for the user detail view.
pub async fn recent_analyses_for_user(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<Analysis>, StoreError> {
    list_analyses(pool, Some(user_id), None, limit, 0).await
}

/// Delete an analysis record. Returns whether a row existed.
pub async fn delete_analysis(pool: &SqlitePool, task_id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM analyses WHERE task_id = ?1")
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
