//! Engine adapters: one per engine family, translating the normalized
//! request/response types to and from each engine's native wire protocol.

pub mod common;
pub mod deepspeed;
pub mod lmdeploy;
pub mod ollama;
pub mod sglang;
pub mod tensorrt;
pub mod tgi;
pub mod vllm;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::model::{InferenceRequest, InferenceResponse, StreamChunk};

/// Per-engine-family liveness signal returned by `health_check`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AdapterHealth {
    Healthy,
    Unhealthy(String),
}

/// Translates a normalized request into one engine family's wire format
/// and its response back. Adapters are stateless apart from their
/// endpoint reference; they borrow a client per call from the pool
/// rather than owning one.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    fn family_name(&self) -> &'static str;

    async fn generate(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse>;

    /// Lazy, cancel-safe sequence of output chunks. Dropping the stream
    /// before exhaustion closes the underlying transport; callers that
    /// cancel mid-stream must treat that as a completed (not failed)
    /// invocation for metrics purposes (the manager enforces this, not
    /// the adapter).
    async fn stream(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>>;

    async fn embeddings(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        let _ = (client, request);
        Err(crate::error::OrchestratorError::ClientError(
            "this engine family does not support embeddings".into(),
        ))
    }

    async fn health_check(&self, client: &reqwest::Client, probe_path: &str) -> AdapterHealth;

    async fn list_models(&self, client: &reqwest::Client) -> Result<Vec<String>>;
}
