//! Per-engine connection pool: a shared, persistent HTTP client with
//! non-blocking bounded concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{OrchestratorError, Result};

fn default_max_concurrent() -> usize {
    32
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_keepalive_idle_secs() -> u64 {
    30
}

/// Per-engine pool tunables, fixed at construction; no runtime
/// reconfiguration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_keepalive_idle_secs")]
    pub keepalive_idle_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            keepalive_idle_secs: default_keepalive_idle_secs(),
        }
    }
}

impl PoolConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn build_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(self.request_timeout())
            .pool_idle_timeout(Duration::from_secs(self.keepalive_idle_secs))
            .build()
            .expect("reqwest client configuration is always valid")
    }
}

/// A permit to use the pool's shared client, released on drop.
pub struct ClientHandle {
    client: reqwest::Client,
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl ClientHandle {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Snapshot of a pool's current utilization.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub current_in_flight: usize,
    pub max_concurrent: usize,
}

impl PoolStats {
    pub fn utilization(&self) -> f64 {
        if self.max_concurrent == 0 {
            0.0
        } else {
            self.current_in_flight as f64 / self.max_concurrent as f64
        }
    }
}

/// One engine's shared, persistent client plus its admission semaphore.
/// `current_in_flight <= max_concurrent` at every instant (I1).
pub struct ConnectionPool {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
    in_flight: Arc<AtomicUsize>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        let client = config.build_client();
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            config,
        }
    }

    /// Non-blocking admission: returns `Saturated` immediately if
    /// `max_concurrent` permits are already checked out.
    pub fn acquire(&self) -> Result<ClientHandle> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                self.in_flight.fetch_add(1, Ordering::Relaxed);
                Ok(ClientHandle {
                    client: self.client.clone(),
                    _permit: permit,
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
            Err(TryAcquireError::NoPermits) => Err(OrchestratorError::Saturated),
            Err(TryAcquireError::Closed) => {
                Err(OrchestratorError::Internal("pool semaphore closed".into()))
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            current_in_flight: self.in_flight.load(Ordering::Relaxed),
            max_concurrent: self.config.max_concurrent,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout()
    }
}
