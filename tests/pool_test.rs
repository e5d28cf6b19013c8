use engine_orchestrator::error::OrchestratorError;
use engine_orchestrator::pool::{ConnectionPool, PoolConfig};

#[test]
fn saturated_pool_denies_admission_without_blocking() {
    let pool = ConnectionPool::new(PoolConfig {
        max_concurrent: 1,
        ..Default::default()
    });

    let handle = pool.acquire().unwrap();
    let err = pool.acquire().unwrap_err();
    assert!(matches!(err, OrchestratorError::Saturated));

    drop(handle);
    assert!(pool.acquire().is_ok());
}

#[test]
fn current_in_flight_never_exceeds_max_concurrent() {
    let pool = ConnectionPool::new(PoolConfig {
        max_concurrent: 3,
        ..Default::default()
    });

    let mut handles = Vec::new();
    for _ in 0..3 {
        handles.push(pool.acquire().unwrap());
    }
    assert!(pool.acquire().is_err());
    assert_eq!(pool.stats().current_in_flight, 3);
    assert!(pool.stats().current_in_flight <= pool.stats().max_concurrent);
}
