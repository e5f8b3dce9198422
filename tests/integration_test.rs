//! Integration test for the Redis-backed queue and the worker's state-sync
//! path.
//!
//! Requires a running Redis instance configured via REDIS_URL (defaults to
//! redis://localhost:6379/0).
//!
//! Run with: cargo test --test integration_test -- --ignored

use std::time::Duration;

use financial_analyzer::services::queue::{TaskQueue, TaskState};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".to_string())
}

#[tokio::test]
#[ignore] // Requires a running Redis instance
async fn test_queue_round_trip() {
    let queue = TaskQueue::new(&redis_url(), 3600).expect("Failed to initialize queue");
    queue.health_check().await.expect("Redis not reachable");

    // 1. Enqueue generates the task id
    let task_id = queue
        .enqueue("test query", "data/financial_document_test.pdf")
        .await
        .expect("Failed to enqueue");

    // 2. A never-reported task reads as pending
    assert_eq!(queue.get_state(task_id).await.expect("get_state"), None);

    // 3. Dequeue delivers the job and leaves it unacknowledged
    let delivery = loop {
        match queue.dequeue().await.expect("Failed to dequeue") {
            Some(d) if d.job.task_id == task_id => break d,
            // Skip leftovers from other runs; they stay on the processing list.
            Some(_) => continue,
            None => panic!("No job in queue"),
        }
    };
    assert_eq!(delivery.job.query, "test query");
    assert_eq!(delivery.job.retry_count, 0);

    // 4. State reporting round-trips through the result channel
    queue
        .set_state(
            task_id,
            &TaskState::Processing {
                message: "Running analysis pipeline...".to_string(),
            },
        )
        .await
        .expect("set_state");
    let observed = queue.get_state(task_id).await.expect("get_state");
    assert!(matches!(observed, Some(TaskState::Processing { .. })));

    // 5. Schedule a retry with no delay; the next dequeue promotes it with
    //    the retry count incremented and the same task id.
    queue
        .schedule_retry(&delivery.job, Duration::ZERO)
        .await
        .expect("schedule_retry");
    queue.ack(&delivery).await.expect("ack");

    let retried = loop {
        match queue.dequeue().await.expect("Failed to dequeue retry") {
            Some(d) if d.job.task_id == task_id => break d,
            Some(_) => continue,
            None => panic!("Scheduled retry was not promoted"),
        }
    };
    assert_eq!(retried.job.retry_count, 1);
    assert_eq!(retried.job.query, "test query");

    // 6. Terminal state is visible to pollers until the result expires
    queue
        .set_state(
            task_id,
            &TaskState::Success {
                query: "test query".to_string(),
                analysis: "OK".to_string(),
                file_path: "data/financial_document_test.pdf".to_string(),
            },
        )
        .await
        .expect("set_state success");
    match queue.get_state(task_id).await.expect("get_state") {
        Some(TaskState::Success { analysis, .. }) => assert_eq!(analysis, "OK"),
        other => panic!("Expected success state, got {other:?}"),
    }

    queue.ack(&retried).await.expect("final ack");
}

#[tokio::test]
#[ignore] // Requires a running Redis instance
async fn test_requeue_returns_job_for_redelivery() {
    let queue = TaskQueue::new(&redis_url(), 3600).expect("Failed to initialize queue");
    queue.health_check().await.expect("Redis not reachable");

    let task_id = queue
        .enqueue("requeue test", "data/financial_document_requeue.pdf")
        .await
        .expect("Failed to enqueue");

    let delivery = loop {
        match queue.dequeue().await.expect("dequeue") {
            Some(d) if d.job.task_id == task_id => break d,
            Some(_) => continue,
            None => panic!("No job in queue"),
        }
    };

    // Simulate a mid-job infrastructure failure: return the payload.
    queue.requeue(&delivery).await.expect("requeue");

    let redelivered = loop {
        match queue.dequeue().await.expect("dequeue after requeue") {
            Some(d) if d.job.task_id == task_id => break d,
            Some(_) => continue,
            None => panic!("Requeued job was not redelivered"),
        }
    };
    assert_eq!(redelivered.job.retry_count, delivery.job.retry_count);

    queue.ack(&redelivered).await.expect("ack");
}
