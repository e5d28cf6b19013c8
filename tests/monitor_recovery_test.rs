mod common;

use std::time::Duration;

use common::{manager_with_engines, sample_request, MockAdapter};
use engine_orchestrator::breaker::{BreakerConfig, Phase};
use engine_orchestrator::config::MonitorConfig;
use engine_orchestrator::monitor::HealthMonitor;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn breaker_closes_after_monitor_observes_a_healthy_recovery_probe() {
    let breaker_config = BreakerConfig {
        failure_threshold: 2,
        recovery_timeout_secs: 5,
    };
    // Two failures trip the breaker; `MockAdapter::failing_n_times` then
    // reports `Healthy` on every subsequent health_check (fail_remaining
    // has hit zero), simulating a backend that recovered on its own.
    let manager = manager_with_engines(
        vec![("e1", MockAdapter::failing_n_times("e1", 2), breaker_config)],
        "m1",
    );

    assert!(manager
        .generate(&sample_request("m1"), &CancellationToken::new())
        .await
        .is_err());
    assert!(manager
        .generate(&sample_request("m1"), &CancellationToken::new())
        .await
        .is_err());
    assert_eq!(
        manager.engine(&"e1".into()).unwrap().breaker.phase(),
        Phase::Open
    );

    let monitor = HealthMonitor::new(
        manager.clone(),
        MonitorConfig {
            probe_interval_secs: 1,
            healthy_probe_interval_secs: 60,
        },
    );
    let cancel = CancellationToken::new();
    let handle = monitor.clone().spawn(cancel.clone());

    // Advance past both the breaker's recovery timeout and several
    // monitor probe ticks, yielding after each so the probe task is
    // actually polled and has a chance to observe the recovery.
    for _ in 0..10 {
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
    }

    assert_eq!(
        manager.engine(&"e1".into()).unwrap().breaker.phase(),
        Phase::Closed
    );

    cancel.cancel();
    handle.await.unwrap();
}
