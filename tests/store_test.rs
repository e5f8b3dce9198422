//! Store-layer tests against an in-memory SQLite database.
//!
//! These exercise the job lifecycle invariants: unique task ids, coalescing
//! partial updates, idempotent terminal syncs, monotone status transitions,
//! filtered listing, stats, and user-deletion orphaning.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use financial_analyzer::db::{self, queries, StoreError};
use financial_analyzer::models::analysis::AnalysisStatus;

async fn test_pool() -> SqlitePool {
    let options = "sqlite::memory:"
        .parse::<SqliteConnectOptions>()
        .expect("parse options")
        .foreign_keys(true);

    // A single connection keeps the in-memory database shared across queries.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("connect to in-memory sqlite");

    db::run_migrations(&pool).await.expect("run migrations");
    pool
}

async fn seed_analysis(pool: &SqlitePool, user_id: Option<i64>) -> String {
    let task_id = Uuid::new_v4().to_string();
    queries::create_analysis(pool, &task_id, user_id, "report.pdf", 1024, "test query")
        .await
        .expect("create analysis");
    task_id
}

#[tokio::test]
async fn test_submission_creates_queued_row_with_matching_task_id() {
    let pool = test_pool().await;

    let task_id = Uuid::new_v4().to_string();
    let record = queries::create_analysis(&pool, &task_id, None, "10k.pdf", 10, "test")
        .await
        .expect("create analysis");

    assert_eq!(record.task_id, task_id);
    assert_eq!(record.status, AnalysisStatus::Queued);
    assert_eq!(record.file_size, 10);
    assert!(record.analysis.is_none());
    assert!(record.error.is_none());
    assert!(record.completed_at.is_none());

    let fetched = queries::get_analysis_by_task_id(&pool, &task_id)
        .await
        .expect("get analysis")
        .expect("row exists");
    assert_eq!(fetched, record);
}

#[tokio::test]
async fn test_duplicate_task_id_is_unique_violation() {
    let pool = test_pool().await;
    let task_id = seed_analysis(&pool, None).await;

    let err = queries::create_analysis(&pool, &task_id, None, "again.pdf", 5, "test")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));
}

#[tokio::test]
async fn test_duplicate_username_is_conflict_with_single_row() {
    let pool = test_pool().await;

    queries::create_user(&pool, "alice", None)
        .await
        .expect("first alice");
    let err = queries::create_user(&pool, "alice", None).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));

    assert_eq!(queries::count_users(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_terminal_sync_is_idempotent() {
    let pool = test_pool().await;
    let task_id = seed_analysis(&pool, None).await;

    queries::update_analysis_status(&pool, &task_id, AnalysisStatus::Success, Some("OK"), None)
        .await
        .expect("first success sync");
    let first = queries::get_analysis_by_task_id(&pool, &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, AnalysisStatus::Success);
    assert_eq!(first.analysis.as_deref(), Some("OK"));
    let completed_at = first.completed_at.expect("completed_at set on terminal");

    // At-least-once delivery may replay the same terminal sync.
    queries::update_analysis_status(&pool, &task_id, AnalysisStatus::Success, Some("OK"), None)
        .await
        .expect("second success sync");
    let second = queries::get_analysis_by_task_id(&pool, &task_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(second, first);
    assert_eq!(second.completed_at, Some(completed_at));
}

#[tokio::test]
async fn test_coalescing_update_never_clears_fields() {
    let pool = test_pool().await;
    let task_id = seed_analysis(&pool, None).await;

    queries::update_analysis_status(
        &pool,
        &task_id,
        AnalysisStatus::Failed,
        None,
        Some("pipeline exploded"),
    )
    .await
    .unwrap();

    // A racing reconciliation poll writes processing with no analysis/error.
    queries::update_analysis_status(&pool, &task_id, AnalysisStatus::Processing, None, None)
        .await
        .unwrap();

    let row = queries::get_analysis_by_task_id(&pool, &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.error.as_deref(), Some("pipeline exploded"));
}

#[tokio::test]
async fn test_terminal_status_never_regresses() {
    let pool = test_pool().await;
    let task_id = seed_analysis(&pool, None).await;

    queries::update_analysis_status(&pool, &task_id, AnalysisStatus::Success, Some("done"), None)
        .await
        .unwrap();

    for status in [
        AnalysisStatus::Queued,
        AnalysisStatus::Processing,
        AnalysisStatus::Retrying,
    ] {
        queries::update_analysis_status(&pool, &task_id, status, None, None)
            .await
            .unwrap();
        let row = queries::get_analysis_by_task_id(&pool, &task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, AnalysisStatus::Success);
        assert!(row.completed_at.is_some());
    }
}

#[tokio::test]
async fn test_late_conflicting_terminal_sync_leaves_row_frozen() {
    let pool = test_pool().await;
    let task_id = seed_analysis(&pool, None).await;

    queries::update_analysis_status(&pool, &task_id, AnalysisStatus::Success, Some("OK"), None)
        .await
        .unwrap();

    // A replayed delivery (success recorded, crash before ack, transient file
    // already gone) fails on the second pass and syncs a failed outcome.
    queries::update_analysis_status(
        &pool,
        &task_id,
        AnalysisStatus::Failed,
        None,
        Some("failed to read document at data/x.pdf"),
    )
    .await
    .unwrap();

    let row = queries::get_analysis_by_task_id(&pool, &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, AnalysisStatus::Success);
    assert_eq!(row.analysis.as_deref(), Some("OK"));
    assert_eq!(row.error, None, "failed-sync error must not land on a success row");

    // And symmetrically: a late success sync cannot write into a failed row.
    let other = seed_analysis(&pool, None).await;
    queries::update_analysis_status(&pool, &other, AnalysisStatus::Failed, None, Some("boom"))
        .await
        .unwrap();
    queries::update_analysis_status(&pool, &other, AnalysisStatus::Success, Some("late"), None)
        .await
        .unwrap();

    let row = queries::get_analysis_by_task_id(&pool, &other)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, AnalysisStatus::Failed);
    assert_eq!(row.analysis, None);
    assert_eq!(row.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_non_terminal_transitions_move_forward() {
    let pool = test_pool().await;
    let task_id = seed_analysis(&pool, None).await;

    queries::update_analysis_status(&pool, &task_id, AnalysisStatus::Processing, None, None)
        .await
        .unwrap();
    queries::update_analysis_status(&pool, &task_id, AnalysisStatus::Retrying, None, None)
        .await
        .unwrap();

    let row = queries::get_analysis_by_task_id(&pool, &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, AnalysisStatus::Retrying);
    assert!(row.completed_at.is_none());
}

#[tokio::test]
async fn test_filtered_listing_returns_most_recent_first() {
    let pool = test_pool().await;

    let mut failed_ids = Vec::new();
    for _ in 0..3 {
        let task_id = seed_analysis(&pool, None).await;
        queries::update_analysis_status(&pool, &task_id, AnalysisStatus::Failed, None, Some("x"))
            .await
            .unwrap();
        failed_ids.push(task_id);
    }
    for _ in 0..2 {
        let task_id = seed_analysis(&pool, None).await;
        queries::update_analysis_status(&pool, &task_id, AnalysisStatus::Success, Some("ok"), None)
            .await
            .unwrap();
    }

    let page =
        queries::list_analyses(&pool, None, Some(AnalysisStatus::Failed), 1, 0).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].task_id, *failed_ids.last().unwrap());

    let count = queries::count_analyses(&pool, None, Some(AnalysisStatus::Failed))
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_listing_pagination_offsets() {
    let pool = test_pool().await;
    for _ in 0..5 {
        seed_analysis(&pool, None).await;
    }

    let first = queries::list_analyses(&pool, None, None, 2, 0).await.unwrap();
    let second = queries::list_analyses(&pool, None, None, 2, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert!(first.iter().all(|a| !second.contains(a)));
}

#[tokio::test]
async fn test_stats_aggregate_counts_and_bytes() {
    let pool = test_pool().await;

    let user = queries::create_user(&pool, "bob", Some("bob@example.com"))
        .await
        .unwrap();

    let t1 = seed_analysis(&pool, Some(user.id)).await;
    queries::update_analysis_status(&pool, &t1, AnalysisStatus::Success, Some("ok"), None)
        .await
        .unwrap();
    let t2 = seed_analysis(&pool, Some(user.id)).await;
    queries::update_analysis_status(&pool, &t2, AnalysisStatus::Failed, None, Some("err"))
        .await
        .unwrap();
    seed_analysis(&pool, Some(user.id)).await; // stays queued
    seed_analysis(&pool, None).await; // other user's work

    let stats = queries::analysis_stats(&pool, Some(user.id)).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.in_progress, 1);
    assert_eq!(stats.total_bytes_processed, 3 * 1024);

    let global = queries::analysis_stats(&pool, None).await.unwrap();
    assert_eq!(global.total, 4);
}

#[tokio::test]
async fn test_stats_on_empty_store_are_zero() {
    let pool = test_pool().await;
    let stats = queries::analysis_stats(&pool, None).await.unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.total_bytes_processed, 0);
}

#[tokio::test]
async fn test_deleting_user_orphans_analyses() {
    let pool = test_pool().await;

    let user = queries::create_user(&pool, "carol", None).await.unwrap();
    let task_id = seed_analysis(&pool, Some(user.id)).await;

    assert!(queries::delete_user(&pool, user.id).await.unwrap());
    assert!(queries::get_user(&pool, user.id).await.unwrap().is_none());

    let row = queries::get_analysis_by_task_id(&pool, &task_id)
        .await
        .unwrap()
        .expect("analysis row persists");
    assert_eq!(row.user_id, None);
}

#[tokio::test]
async fn test_delete_analysis_reports_existence() {
    let pool = test_pool().await;
    let task_id = seed_analysis(&pool, None).await;

    assert!(queries::delete_analysis(&pool, &task_id).await.unwrap());
    assert!(!queries::delete_analysis(&pool, &task_id).await.unwrap());
    assert!(queries::get_analysis_by_task_id(&pool, &task_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_user_listing_and_recent_analyses() {
    let pool = test_pool().await;

    let user = queries::create_user(&pool, "dora", None).await.unwrap();
    for _ in 0..12 {
        seed_analysis(&pool, Some(user.id)).await;
    }

    let recent = queries::recent_analyses_for_user(&pool, user.id, 10)
        .await
        .unwrap();
    assert_eq!(recent.len(), 10);

    let users = queries::list_users(&pool, 50, 0).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "dora");
}
