mod common;

use std::time::Duration;

use common::{manager_with_engines, sample_request, MockAdapter};
use engine_orchestrator::breaker::BreakerConfig;
use engine_orchestrator::config::WorkerConfig;
use engine_orchestrator::worker::{InferenceWorker, JobState, Priority};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn a_job_stuck_running_past_the_stale_threshold_is_forced_to_failed() {
    // Delay far longer than the stale threshold so the cleanup loop is
    // guaranteed to observe the job mid-flight.
    let manager = manager_with_engines(
        vec![(
            "e1",
            MockAdapter::healthy("e1").with_delay_ms(120_000),
            BreakerConfig::default(),
        )],
        "m1",
    );

    let worker = InferenceWorker::new(
        manager,
        WorkerConfig {
            concurrency: 1,
            queue_capacity_per_priority: 16,
            expiry_window_secs: 3600,
            stale_threshold_secs: 5,
            retention_window_secs: 3600,
        },
    );
    let cancel = CancellationToken::new();
    let handles = worker.clone().spawn(cancel.clone());

    let job_id = worker
        .submit(sample_request("m1"), Priority::Normal)
        .await
        .unwrap();

    // Let the dequeue loop pick the job up and transition it to Running.
    for _ in 0..5 {
        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
    }
    assert_eq!(worker.status(job_id).await.unwrap().state, JobState::Running);

    // Cross the stale threshold, then let a 60s cleanup tick fire.
    for _ in 0..70 {
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
    }

    let job = worker.status(job_id).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error.is_some());

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}
