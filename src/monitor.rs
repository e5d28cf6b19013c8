//! Health monitor: drives circuit-breaker recovery via periodic probes
//! and exposes an aggregate liveness signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterHealth;
use crate::breaker::{Admit, Outcome, Phase};
use crate::config::MonitorConfig;
use crate::manager::EngineManager;
use crate::model::EngineIdentity;

/// Rolling per-engine counters, updated by both the manager's dispatch
/// path and the monitor's probes. Read-only outside this module's update
/// path; snapshots are best-effort and need not be linearizable with
/// respect to each other.
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    pub requests_ok: u64,
    pub requests_err: u64,
    pub last_ok_at: Option<Instant>,
    pub last_err_at: Option<Instant>,
}

/// One engine's entry in a [`HealthSnapshot`].
#[derive(Debug, Clone)]
pub struct EngineHealth {
    pub phase: Phase,
    pub last_ok_at: Option<Instant>,
    pub last_err_at: Option<Instant>,
}

/// The aggregate liveness view returned by the `health` operation.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub degraded: bool,
    pub per_engine: HashMap<EngineIdentity, EngineHealth>,
}

/// Background task driving breaker recovery. Owns a shared metrics table
/// keyed by engine.
pub struct HealthMonitor {
    manager: Arc<EngineManager>,
    config: MonitorConfig,
    metrics: RwLock<HashMap<EngineIdentity, EngineMetrics>>,
}

impl HealthMonitor {
    pub fn new(manager: Arc<EngineManager>, config: MonitorConfig) -> Arc<Self> {
        let metrics = manager
            .engine_ids()
            .map(|id| (id.clone(), EngineMetrics::default()))
            .collect();
        Arc::new(Self {
            manager,
            config,
            metrics: RwLock::new(metrics),
        })
    }

    /// Spawns the probe loop. The returned handle should be aborted (or
    /// the `cancel` token cancelled) on shutdown; cancellation is honored
    /// at the top of each loop iteration, and any in-flight probe is
    /// allowed to complete before the task exits.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut recovery_tick = tokio::time::interval(Duration::from_secs(self.config.probe_interval_secs));
        let mut healthy_tick =
            tokio::time::interval(Duration::from_secs(self.config.healthy_probe_interval_secs));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("health monitor received shutdown signal");
                    break;
                }
                _ = recovery_tick.tick() => {
                    self.probe_recovering_engines().await;
                }
                _ = healthy_tick.tick() => {
                    self.probe_healthy_engines().await;
                }
            }
        }
    }

    async fn probe_recovering_engines(&self) {
        for id in self.manager.engine_ids() {
            let Some(engine) = self.manager.engine(id) else {
                continue;
            };
            if engine.breaker.phase() != Phase::Open {
                continue;
            }
            if engine.breaker.allow_request() != Admit::Allowed {
                continue;
            }

            tracing::info!(engine = %id, "probing recovering engine");
            let client = reqwest::Client::new();
            let health = engine.adapter.health_check(&client, &engine.endpoint.probe_path).await;
            match health {
                AdapterHealth::Healthy => {
                    engine.breaker.record(Outcome::Ok);
                    self.record_ok(id).await;
                }
                AdapterHealth::Unhealthy(reason) => {
                    tracing::warn!(engine = %id, reason, "recovery probe failed");
                    engine.breaker.record(Outcome::Fail);
                    self.record_err(id).await;
                }
            }
        }
    }

    async fn probe_healthy_engines(&self) {
        for id in self.manager.engine_ids() {
            let Some(engine) = self.manager.engine(id) else {
                continue;
            };
            if engine.breaker.phase() != Phase::Closed {
                continue;
            }

            let client = reqwest::Client::new();
            let health = engine.adapter.health_check(&client, &engine.endpoint.probe_path).await;
            match health {
                AdapterHealth::Healthy => self.record_ok(id).await,
                AdapterHealth::Unhealthy(reason) => {
                    tracing::debug!(engine = %id, reason, "light probe observed degradation");
                    self.record_err(id).await;
                }
            }
        }
    }

    async fn record_ok(&self, id: &EngineIdentity) {
        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry(id.clone()).or_default();
        entry.requests_ok += 1;
        entry.last_ok_at = Some(Instant::now());
    }

    async fn record_err(&self, id: &EngineIdentity) {
        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry(id.clone()).or_default();
        entry.requests_err += 1;
        entry.last_err_at = Some(Instant::now());
    }

    /// `degraded = every engine's breaker is OPEN`.
    pub async fn snapshot(&self) -> HealthSnapshot {
        let metrics = self.metrics.read().await;
        let mut per_engine = HashMap::new();
        let mut all_open = true;

        for id in self.manager.engine_ids() {
            let Some(engine) = self.manager.engine(id) else {
                continue;
            };
            let phase = engine.breaker.phase();
            if phase != Phase::Open {
                all_open = false;
            }
            let m = metrics.get(id).cloned().unwrap_or_default();
            per_engine.insert(
                id.clone(),
                EngineHealth {
                    phase,
                    last_ok_at: m.last_ok_at,
                    last_err_at: m.last_err_at,
                },
            );
        }

        HealthSnapshot {
            degraded: !per_engine.is_empty() && all_open,
            per_engine,
        }
    }
}
