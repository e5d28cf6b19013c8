//! Adapter for SGLang's OpenAI-compatible HTTP API.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::json;

use super::common::{check_http_status, classify_transport_error, join_url};
use super::vllm::parse_openai_sse;
use super::{AdapterHealth, EngineAdapter};
use crate::error::{OrchestratorError, Result};
use crate::model::{InferenceRequest, InferenceResponse, StreamChunk, TokenCounts};

pub struct SglangAdapter {
    base_url: String,
}

impl SglangAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn payload(&self, request: &InferenceRequest, stream: bool) -> serde_json::Value {
        json!({
            "model": request.model_id,
            "messages": request.messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stop": request.stop,
            "stream": stream,
        })
    }
}

#[async_trait]
impl EngineAdapter for SglangAdapter {
    fn family_name(&self) -> &'static str {
        "sglang"
    }

    #[tracing::instrument(skip(self, client, request), fields(engine = "sglang"))]
    async fn generate(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        let start = std::time::Instant::now();
        let url = join_url(&self.base_url, "/v1/chat/completions");
        let resp = client
            .post(url)
            .json(&self.payload(request, false))
            .send()
            .await
            .map_err(|e| classify_transport_error("sglang", &e))?;
        let resp = check_http_status("sglang", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("sglang bad body: {e}")))?;

        let choice = body["choices"].get(0).ok_or_else(|| {
            OrchestratorError::Unavailable("sglang response missing choices".into())
        })?;

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: "sglang".into(),
            output_text: choice["message"]["content"].as_str().map(str::to_owned),
            embedding_vector: None,
            token_counts: TokenCounts {
                prompt: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion: body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
            },
            latency_ms: start.elapsed().as_millis() as u64,
            finish_reason: choice["finish_reason"].as_str().map(str::to_owned),
        })
    }

    async fn stream(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let url = join_url(&self.base_url, "/v1/chat/completions");
        let resp = client
            .post(url)
            .json(&self.payload(request, true))
            .send()
            .await
            .map_err(|e| classify_transport_error("sglang", &e))?;
        let resp = check_http_status("sglang", resp).await?;
        parse_openai_sse("sglang", resp)
    }

    async fn health_check(&self, client: &reqwest::Client, probe_path: &str) -> AdapterHealth {
        let url = join_url(&self.base_url, probe_path);
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => AdapterHealth::Healthy,
            Ok(resp) => AdapterHealth::Unhealthy(format!("status {}", resp.status())),
            Err(e) => AdapterHealth::Unhealthy(e.to_string()),
        }
    }

    async fn list_models(&self, client: &reqwest::Client) -> Result<Vec<String>> {
        let url = join_url(&self.base_url, "/v1/models");
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error("sglang", &e))?;
        let resp = check_http_status("sglang", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("sglang bad body: {e}")))?;
        Ok(body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }
}
