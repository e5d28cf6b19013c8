//! Shared test-double adapter and gateway-assembly helpers for
//! integration tests. Integration test binaries can't reach into the
//! crate's private `#[cfg(test)]` mock module, so this is a small
//! standalone double built entirely on the public API.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use engine_orchestrator::adapter::{AdapterHealth, EngineAdapter};
use engine_orchestrator::breaker::{BreakerConfig, CircuitBreaker};
use engine_orchestrator::error::{OrchestratorError, Result};
use engine_orchestrator::manager::{EngineManager, ManagedEngine};
use engine_orchestrator::model::{
    Capability, EngineEndpoint, EngineFamily, EngineIdentity, InferenceRequest, InferenceResponse,
    ModelDescriptor, StreamChunk, TokenCounts,
};
use engine_orchestrator::pool::{ConnectionPool, PoolConfig};
use engine_orchestrator::registry::ModelRegistry;
use futures::stream::BoxStream;

/// A controllable adapter double: fails a configured number of times
/// with either a 5xx-equivalent (`Unavailable`, retryable and counts
/// against the breaker) or a 4xx-equivalent (`ClientError`, terminal and
/// never counts against the breaker), then succeeds.
pub struct MockAdapter {
    pub name: &'static str,
    fail_remaining: AtomicU32,
    fail_kind: FailKind,
    delay_ms: AtomicU64,
    pub calls: Arc<AtomicU64>,
}

#[derive(Clone, Copy)]
enum FailKind {
    None,
    Unavailable,
    ClientError,
}

impl MockAdapter {
    pub fn healthy(name: &'static str) -> Self {
        Self {
            name,
            fail_remaining: AtomicU32::new(0),
            fail_kind: FailKind::None,
            delay_ms: AtomicU64::new(0),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn failing_n_times(name: &'static str, n: u32) -> Self {
        Self {
            name,
            fail_remaining: AtomicU32::new(n),
            fail_kind: FailKind::Unavailable,
            delay_ms: AtomicU64::new(0),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn always_client_error(name: &'static str) -> Self {
        Self {
            name,
            fail_remaining: AtomicU32::new(u32::MAX),
            fail_kind: FailKind::ClientError,
            delay_ms: AtomicU64::new(0),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_delay_ms(self, ms: u64) -> Self {
        self.delay_ms.store(ms, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineAdapter for MockAdapter {
    fn family_name(&self) -> &'static str {
        self.name
    }

    async fn generate(
        &self,
        _client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return match self.fail_kind {
                FailKind::Unavailable => {
                    Err(OrchestratorError::Unavailable(format!("{} down", self.name)))
                }
                FailKind::ClientError => {
                    Err(OrchestratorError::ClientError(format!("{} bad request", self.name)))
                }
                FailKind::None => unreachable!(),
            };
        }

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: self.name.into(),
            output_text: Some(format!("response from {}", self.name)),
            embedding_vector: None,
            token_counts: TokenCounts {
                prompt: 3,
                completion: 7,
            },
            latency_ms: 0,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn stream(
        &self,
        _client: &reqwest::Client,
        _request: &InferenceRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        Ok(Box::pin(futures::stream::iter(vec![Ok(StreamChunk {
            delta: "ok".to_string(),
            finished: true,
            token_counts: Some(TokenCounts::default()),
            finish_reason: Some("stop".to_string()),
        })])))
    }

    async fn health_check(&self, _client: &reqwest::Client, _probe_path: &str) -> AdapterHealth {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            AdapterHealth::Unhealthy(format!("{} unhealthy", self.name))
        } else {
            AdapterHealth::Healthy
        }
    }

    async fn list_models(&self, _client: &reqwest::Client) -> Result<Vec<String>> {
        Ok(vec![format!("{}-model", self.name)])
    }
}

/// Builds a one-or-two-engine [`EngineManager`] wired with mock adapters,
/// for tests that exercise selection/failover without any real HTTP.
pub fn manager_with_engines(
    engines: Vec<(&'static str, MockAdapter, BreakerConfig)>,
    model_id: &str,
) -> Arc<EngineManager> {
    let mut preference = Vec::new();
    let mut managed = HashMap::new();

    for (name, adapter, breaker_config) in engines {
        let identity = EngineIdentity::new(name);
        preference.push(identity.clone());
        let endpoint = EngineEndpoint {
            identity: identity.clone(),
            family: EngineFamily::Vllm,
            base_url: format!("http://{name}.invalid"),
            declared_capabilities: BTreeSet::from([Capability::Generate, Capability::Stream]),
            probe_path: "/health".to_string(),
        };
        managed.insert(
            identity,
            ManagedEngine {
                endpoint,
                adapter: Box::new(adapter),
                breaker: CircuitBreaker::new(breaker_config),
                pool: ConnectionPool::new(PoolConfig::default()),
            },
        );
    }

    let registry = Arc::new(ModelRegistry::new(vec![ModelDescriptor {
        model_id: model_id.to_string(),
        engine_preference: preference,
        capability_set: BTreeSet::from([Capability::Generate]),
        quantization_tag: None,
        retired: false,
    }]));

    Arc::new(EngineManager::new(managed, registry))
}

pub fn sample_request(model_id: &str) -> InferenceRequest {
    InferenceRequest {
        model_id: model_id.to_string(),
        messages: vec![engine_orchestrator::model::Message {
            role: "user".to_string(),
            content: "hello".to_string(),
        }],
        prompt: None,
        max_tokens: Some(32),
        temperature: None,
        top_p: None,
        stop: vec![],
        stream: false,
        embedding_input: vec![],
        trace_id: "trace-test".to_string(),
    }
}
