//! In-process mock engine adapter for exercising the manager, breaker,
//! pool, and worker without a real HTTP backend.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::adapter::{AdapterHealth, EngineAdapter};
use crate::error::{OrchestratorError, Result};
use crate::model::{InferenceRequest, InferenceResponse, StreamChunk, TokenCounts};

/// A controllable adapter double: can be made to fail N times before
/// succeeding, introduce an artificial delay, or report unhealthy,
/// mirroring the failure-injection knobs real engine backends need
/// during development.
pub struct MockAdapter {
    family: &'static str,
    fail_count: AtomicU32,
    fail_with_client_error: bool,
    delay_ms: AtomicU64,
    healthy: std::sync::atomic::AtomicBool,
    call_count: Arc<AtomicU64>,
}

impl MockAdapter {
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            fail_count: AtomicU32::new(0),
            fail_with_client_error: false,
            delay_ms: AtomicU64::new(0),
            healthy: std::sync::atomic::AtomicBool::new(true),
            call_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn failing(mut self, times: u32) -> Self {
        self.fail_count = AtomicU32::new(times);
        self
    }

    pub fn failing_with_client_error(mut self) -> Self {
        self.fail_with_client_error = true;
        self.fail_count = AtomicU32::new(u32::MAX);
        self
    }

    pub fn with_delay_ms(self, ms: u64) -> Self {
        self.delay_ms.store(ms, Ordering::SeqCst);
        self
    }

    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    async fn maybe_delay(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
    }

    fn maybe_fail(&self) -> Result<()> {
        let remaining = self.fail_count.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        if remaining != u32::MAX {
            self.fail_count.fetch_sub(1, Ordering::SeqCst);
        }
        if self.fail_with_client_error {
            Err(OrchestratorError::ClientError(format!("{} rejected request", self.family)))
        } else {
            Err(OrchestratorError::Unavailable(format!("{} unavailable", self.family)))
        }
    }
}

#[async_trait]
impl EngineAdapter for MockAdapter {
    fn family_name(&self) -> &'static str {
        self.family
    }

    async fn generate(
        &self,
        _client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        self.maybe_fail()?;

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: self.family.into(),
            output_text: Some(format!("mock response from {}", self.family)),
            embedding_vector: None,
            token_counts: TokenCounts {
                prompt: 10,
                completion: 5,
            },
            latency_ms: 0,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn stream(
        &self,
        _client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;

        let chunks = vec![
            Ok(StreamChunk {
                delta: "mock ".to_string(),
                finished: false,
                token_counts: None,
                finish_reason: None,
            }),
            Ok(StreamChunk {
                delta: "stream".to_string(),
                finished: true,
                token_counts: Some(TokenCounts {
                    prompt: 10,
                    completion: 2,
                }),
                finish_reason: Some("stop".to_string()),
            }),
        ];
        let _ = request;
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn embeddings(
        &self,
        _client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        self.maybe_fail()?;

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: self.family.into(),
            output_text: None,
            embedding_vector: Some(vec![0.1, 0.2, 0.3]),
            token_counts: TokenCounts::default(),
            latency_ms: 0,
            finish_reason: None,
        })
    }

    async fn health_check(&self, _client: &reqwest::Client, _probe_path: &str) -> AdapterHealth {
        if self.healthy.load(Ordering::SeqCst) {
            AdapterHealth::Healthy
        } else {
            AdapterHealth::Unhealthy(format!("{} is unhealthy", self.family))
        }
    }

    async fn list_models(&self, _client: &reqwest::Client) -> Result<Vec<String>> {
        Ok(vec!["mock-model".to_string()])
    }
}
