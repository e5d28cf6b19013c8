//! Startup configuration: deserializes the whole engine roster, model
//! registry seed, worker policy, and monitor cadence from a single JSON
//! document, then validates it before anything is constructed.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::breaker::BreakerConfig;
use crate::error::{OrchestratorError, Result};
use crate::model::{Capability, EngineFamily, ModelDescriptor};
use crate::pool::PoolConfig;

fn default_worker_concurrency() -> usize {
    4
}

fn default_queue_capacity_per_priority() -> usize {
    1024
}

fn default_expiry_window_secs() -> u64 {
    300
}

fn default_stale_threshold_secs() -> u64 {
    600
}

fn default_retention_window_secs() -> u64 {
    3600
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_healthy_probe_interval_secs() -> u64 {
    60
}

/// One entry in the engine roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub identity: String,
    pub family: EngineFamily,
    pub base_url: String,
    pub capabilities: Vec<Capability>,
    #[serde(default = "crate::model::default_probe_path")]
    pub probe_path: String,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

/// Worker policy, applies to the whole worker (not per-engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_queue_capacity_per_priority")]
    pub queue_capacity_per_priority: usize,
    #[serde(default = "default_expiry_window_secs")]
    pub expiry_window_secs: u64,
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,
    #[serde(default = "default_retention_window_secs")]
    pub retention_window_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_worker_concurrency(),
            queue_capacity_per_priority: default_queue_capacity_per_priority(),
            expiry_window_secs: default_expiry_window_secs(),
            stale_threshold_secs: default_stale_threshold_secs(),
            retention_window_secs: default_retention_window_secs(),
        }
    }
}

/// Health monitor cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_healthy_probe_interval_secs")]
    pub healthy_probe_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            healthy_probe_interval_secs: default_healthy_probe_interval_secs(),
        }
    }
}

/// The whole-system startup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub engines: Vec<EngineConfig>,
    pub models: Vec<ModelDescriptor>,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl GatewayConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| OrchestratorError::Config(format!("invalid configuration json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            OrchestratorError::Config(format!(
                "could not read configuration file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json_str(&text)
    }

    /// Structural deserialization has already happened by the time this
    /// runs; this checks the semantic invariants a bad JSON document could
    /// still violate: non-empty roster, unique identities, every model's
    /// preference list resolves, positive tunables.
    pub fn validate(&self) -> Result<()> {
        if self.engines.is_empty() {
            return Err(OrchestratorError::Config(
                "engine roster must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for engine in &self.engines {
            if engine.identity.trim().is_empty() {
                return Err(OrchestratorError::Config(
                    "engine identity must not be empty".into(),
                ));
            }
            if !seen.insert(engine.identity.as_str()) {
                return Err(OrchestratorError::Config(format!(
                    "duplicate engine identity: {}",
                    engine.identity
                )));
            }
            if engine.pool.max_concurrent == 0 {
                return Err(OrchestratorError::Config(format!(
                    "engine {} pool.max_concurrent must be positive",
                    engine.identity
                )));
            }
            if engine.breaker.failure_threshold == 0 {
                return Err(OrchestratorError::Config(format!(
                    "engine {} breaker.failure_threshold must be positive",
                    engine.identity
                )));
            }
        }

        for model in &self.models {
            for engine_id in &model.engine_preference {
                if !seen.contains(engine_id.as_str()) {
                    return Err(OrchestratorError::Config(format!(
                        "model {} references unknown engine {}",
                        model.model_id, engine_id
                    )));
                }
            }
        }

        if self.worker.concurrency == 0 {
            return Err(OrchestratorError::Config(
                "worker.concurrency must be positive".into(),
            ));
        }
        if self.worker.queue_capacity_per_priority == 0 {
            return Err(OrchestratorError::Config(
                "worker.queue_capacity_per_priority must be positive".into(),
            ));
        }
        if self.monitor.probe_interval_secs == 0 {
            return Err(OrchestratorError::Config(
                "monitor.probe_interval_secs must be positive".into(),
            ));
        }

        Ok(())
    }
}
