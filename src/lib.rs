//! Engine orchestration core for a multi-backend AI inference gateway.
//!
//! This crate is the hard engineering at the center of such a gateway:
//! it maintains a live view of engine health, enforces per-engine
//! isolation under partial failure, schedules requests across engines
//! with failover, and mediates asynchronous job execution with
//! priority, expiry, and cancellation.
//!
//! # Key concepts
//!
//! - **[`Gateway`](gateway::Gateway)** — the assembled orchestration
//!   core; the single type a caller constructs and holds.
//! - **[`EngineManager`](manager::EngineManager)** — resolves a model id
//!   to an engine, with ordered failover across breaker/pool state.
//! - **[`CircuitBreaker`](breaker::CircuitBreaker)** — per-engine
//!   CLOSED/OPEN/HALF_OPEN admission control.
//! - **[`ConnectionPool`](pool::ConnectionPool)** — per-engine bounded,
//!   non-blocking HTTP client admission.
//! - **[`HealthMonitor`](monitor::HealthMonitor)** — periodic probing
//!   that drives breaker recovery.
//! - **[`InferenceWorker`](worker::InferenceWorker)** — priority job
//!   queue with lifecycle, expiry, and cancellation.
//! - **[`ModelRegistry`](registry::ModelRegistry)** — logical model id →
//!   engine preference list, atomically updated.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use engine_orchestrator::config::GatewayConfig;
//! use engine_orchestrator::gateway::Gateway;
//! use engine_orchestrator::model::{InferenceRequest, Message};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_json_str(r#"{
//!     "engines": [{"identity": "e1", "family": "vllm", "base_url": "http://localhost:8000", "capabilities": ["generate"]}],
//!     "models": [{"model_id": "m1", "engine_preference": ["e1"], "capability_set": ["generate"], "quantization_tag": null}]
//! }"#)?;
//!
//! let gateway = Gateway::builder(config).build()?;
//!
//! let request = InferenceRequest {
//!     model_id: "m1".to_string(),
//!     messages: vec![Message { role: "user".to_string(), content: "hi".to_string() }],
//!     prompt: None,
//!     max_tokens: Some(128),
//!     temperature: None,
//!     top_p: None,
//!     stop: vec![],
//!     stream: false,
//!     embedding_input: vec![],
//!     trace_id: "trace-1".to_string(),
//! };
//!
//! let response = gateway.generate(request, CancellationToken::new()).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod breaker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod model;
pub mod monitor;
pub mod pool;
pub mod registry;
pub mod worker;

#[cfg(test)]
pub(crate) mod mock;
