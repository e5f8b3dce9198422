use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::time::Duration;

pub mod queries;

/// Initialize the SQLite connection pool.
///
/// WAL journal mode keeps readers unblocked while a writer's transaction is
/// in flight; foreign keys are enforced so user deletion nulls the analyses'
/// `user_id` reference.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = database_url
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10));

    SqlitePoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Create tables and indexes if they don't exist. Called on startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT UNIQUE NOT NULL,
            email       TEXT UNIQUE,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS analyses (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id       TEXT UNIQUE NOT NULL,
            user_id       INTEGER REFERENCES users(id) ON DELETE SET NULL,
            filename      TEXT NOT NULL,
            file_size     INTEGER NOT NULL DEFAULT 0,
            query         TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'queued',
            analysis      TEXT,
            error         TEXT,
            created_at    TEXT NOT NULL,
            completed_at  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_analyses_task_id ON analyses(task_id);
        CREATE INDEX IF NOT EXISTS idx_analyses_user_id ON analyses(user_id);
        CREATE INDEX IF NOT EXISTS idx_analyses_status  ON analyses(status);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Store-level error type. Unique-key violations are split out so the API
/// layer can map them to a conflict instead of a generic failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Wrap a sqlx error, tagging unique-constraint violations with `what`
    /// (the human-readable name of the conflicting key).
    pub(crate) fn from_sqlx(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                return StoreError::UniqueViolation(what.to_string());
            }
        }
        StoreError::Database(err)
    }
}
