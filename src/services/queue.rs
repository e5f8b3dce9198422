use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const READY_KEY: &str = "financial_analyzer:jobs";
const PROCESSING_KEY: &str = "financial_analyzer:processing";
const SCHEDULED_KEY: &str = "financial_analyzer:scheduled";
const STATE_KEY_PREFIX: &str = "financial_analyzer:task:";

/// How many due scheduled retries to promote per dequeue pass.
const PROMOTE_BATCH: isize = 16;

/// Maximum number of delayed redeliveries per task.
pub const MAX_RETRIES: u32 = 3;

/// Job payload serialized into Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub task_id: Uuid,
    pub query: String,
    pub file_path: String,
    #[serde(default)]
    pub retry_count: u32,
}

/// Queue-held view of a task's state, reported back to pollers.
///
/// This is a time-expiring cache of the same facts the store holds; once the
/// state key expires, pollers read the task as pending again and should fall
/// back to the store for durable history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Processing {
        message: String,
    },
    Retrying {
        message: String,
    },
    Success {
        query: String,
        analysis: String,
        file_path: String,
    },
    Failure {
        error: String,
    },
}

/// A dequeued job together with its raw payload.
///
/// The payload stays on the processing list until [`TaskQueue::ack`] removes
/// it (late ack), so a worker crash mid-processing leaves the job
/// recoverable rather than lost.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: QueuedJob,
    payload: String,
}

/// Redis-backed job queue with delayed-retry and task-state support.
pub struct TaskQueue {
    client: redis::Client,
    result_expires_secs: u64,
}

impl TaskQueue {
    pub fn new(redis_url: &str, result_expires_secs: u64) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            result_expires_secs,
        })
    }

    /// Enqueue a new analysis job. The queue generates the task id.
    pub async fn enqueue(&self, query: &str, file_path: &str) -> Result<Uuid, QueueError> {
        let job = QueuedJob {
            task_id: Uuid::new_v4(),
            query: query.to_string(),
            file_path: file_path.to_string(),
            retry_count: 0,
        };
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(READY_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(job.task_id)
    }

    /// Dequeue a job for processing.
    ///
    /// Promotes any due delayed retries into the ready list first, then moves
    /// one payload from the ready list to the processing list. Each worker
    /// fetches one job at a time; there is no deeper prefetch.
    pub async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        self.promote_due(&mut conn).await?;

        let result: Option<String> = conn
            .rpoplpush(READY_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job: QueuedJob =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(Delivery { job, payload }))
            }
            None => Ok(None),
        }
    }

    /// Acknowledge a delivery after its handler has returned (late ack).
    pub async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &delivery.payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Return an unacknowledged delivery to the ready list for redelivery.
    /// Duplicate processing is absorbed by the store's idempotent syncs.
    pub async fn requeue(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(READY_KEY, &delivery.payload)
            .await
            .map_err(QueueError::Redis)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &delivery.payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Schedule a delayed redelivery of `job` with its retry count
    /// incremented, keeping the same task id. Fails terminally once the
    /// retry bound is used up.
    pub async fn schedule_retry(&self, job: &QueuedJob, delay: Duration) -> Result<(), QueueError> {
        if job.retry_count >= MAX_RETRIES {
            return Err(QueueError::RetryLimitExceeded {
                task_id: job.task_id,
                retry_count: job.retry_count,
            });
        }

        let retried = QueuedJob {
            retry_count: job.retry_count + 1,
            ..job.clone()
        };
        let payload = serde_json::to_string(&retried).map_err(QueueError::Serialize)?;
        let ready_at = Utc::now().timestamp() as f64 + delay.as_secs_f64();

        let mut conn = self.connection().await?;
        conn.zadd::<_, _, _, ()>(SCHEDULED_KEY, &payload, ready_at)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Report a task's state to pollers. The key expires after the configured
    /// result window.
    pub async fn set_state(&self, task_id: Uuid, state: &TaskState) -> Result<(), QueueError> {
        let payload = serde_json::to_string(state).map_err(QueueError::Serialize)?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(Self::state_key(task_id), &payload, self.result_expires_secs)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Read a task's queue-held state. An absent (never written or expired)
    /// key reads as `None`, which pollers treat as pending.
    pub async fn get_state(&self, task_id: Uuid) -> Result<Option<TaskState>, QueueError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(Self::state_key(task_id))
            .await
            .map_err(QueueError::Redis)?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(QueueError::Serialize)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Current number of ready jobs (excludes scheduled retries).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(READY_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    /// Move scheduled payloads whose delay has elapsed onto the ready list.
    /// The ZREM guard makes promotion single-winner across workers.
    async fn promote_due(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> Result<(), QueueError> {
        let now = Utc::now().timestamp() as f64;
        let due: Vec<String> = conn
            .zrangebyscore_limit(SCHEDULED_KEY, 0.0, now, 0, PROMOTE_BATCH)
            .await
            .map_err(QueueError::Redis)?;

        for payload in due {
            let removed: i64 = conn
                .zrem(SCHEDULED_KEY, &payload)
                .await
                .map_err(QueueError::Redis)?;
            if removed > 0 {
                conn.lpush::<_, _, ()>(READY_KEY, &payload)
                    .await
                    .map_err(QueueError::Redis)?;
            }
        }
        Ok(())
    }

    fn state_key(task_id: Uuid) -> String {
        format!("{STATE_KEY_PREFIX}{task_id}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("retry limit exceeded for task {task_id}: {retry_count} retries already used")]
    RetryLimitExceeded { task_id: Uuid, retry_count: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_json_shape() {
        let state = TaskState::Retrying {
            message: "Rate limited. Retrying in 120s...".to_string(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "retrying");
        assert_eq!(json["message"], "Rate limited. Retrying in 120s...");

        let round: TaskState = serde_json::from_value(json).unwrap();
        assert_eq!(round, state);
    }

    #[tokio::test]
    async fn test_schedule_retry_rejects_exhausted_jobs() {
        // The bound check runs before any connection is opened, so no Redis
        // instance is needed here.
        let queue = TaskQueue::new("redis://localhost:6379/0", 3600).unwrap();
        let job = QueuedJob {
            task_id: Uuid::new_v4(),
            query: "q".to_string(),
            file_path: "data/x.pdf".to_string(),
            retry_count: MAX_RETRIES,
        };

        let err = queue
            .schedule_retry(&job, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::RetryLimitExceeded { retry_count, .. } if retry_count == MAX_RETRIES
        ));
    }

    #[test]
    fn test_queued_job_retry_count_defaults_to_zero() {
        // Payloads written before the retry_count field existed still parse.
        let job: QueuedJob = serde_json::from_str(
            r#"{"task_id":"4b8c9d2e-1f3a-4c5b-8d7e-9f0a1b2c3d4e","query":"q","file_path":"data/x.pdf"}"#,
        )
        .unwrap();
        assert_eq!(job.retry_count, 0);
    }
}
