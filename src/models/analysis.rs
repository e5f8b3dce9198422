use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of an analysis job.
///
/// Transitions move forward only: `queued → processing → {success | failed}`,
/// with an optional `processing → retrying → processing` cycle on transient
/// upstream errors, bounded by the worker's retry limit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Queued,
    Processing,
    Retrying,
    Success,
    Failed,
}

impl AnalysisStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisStatus::Success | AnalysisStatus::Failed)
    }
}

/// One document-analysis job as persisted in the `analyses` table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Analysis {
    pub id: i64,
    pub task_id: String,
    pub user_id: Option<i64>,
    pub filename: String,
    pub file_size: i64,
    pub query: String,
    pub status: AnalysisStatus,
    pub analysis: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Aggregate counters over the `analyses` table, optionally scoped to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AnalysisStats {
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub in_progress: i64,
    pub total_bytes_processed: i64,
}

/// Response after submitting a document for analysis.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub task_id: Uuid,
    pub analysis_id: i64,
    pub message: &'static str,
}

/// Response for polling a task's live status.
///
/// Which optional fields are present depends on the status: `message` while
/// pending/processing/retrying, `query` + `analysis` on success, `error` on
/// failure.
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Paginated listing of analyses.
#[derive(Debug, Serialize)]
pub struct AnalysisListResponse {
    pub count: i64,
    pub analyses: Vec<Analysis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(AnalysisStatus::Success.is_terminal());
        assert!(AnalysisStatus::Failed.is_terminal());
        assert!(!AnalysisStatus::Queued.is_terminal());
        assert!(!AnalysisStatus::Processing.is_terminal());
        assert!(!AnalysisStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_status_text_round_trip() {
        assert_eq!(AnalysisStatus::Retrying.to_string(), "retrying");
        assert_eq!(
            "failed".parse::<AnalysisStatus>().unwrap(),
            AnalysisStatus::Failed
        );
        assert_eq!(
            serde_json::to_string(&AnalysisStatus::Success).unwrap(),
            "\"success\""
        );
    }
}
