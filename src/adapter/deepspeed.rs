//! Adapter for a DeepSpeed-MII persistent deployment's HTTP gateway.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::json;

use super::common::{check_http_status, classify_transport_error, join_url};
use super::{AdapterHealth, EngineAdapter};
use crate::error::{OrchestratorError, Result};
use crate::model::{InferenceRequest, InferenceResponse, TokenCounts, StreamChunk};

pub struct DeepSpeedAdapter {
    base_url: String,
}

impl DeepSpeedAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn prompt_of(request: &InferenceRequest) -> String {
        request
            .prompt
            .clone()
            .unwrap_or_else(|| request.messages.iter().map(|m| m.content.clone()).collect::<Vec<_>>().join("\n"))
    }
}

#[async_trait]
impl EngineAdapter for DeepSpeedAdapter {
    fn family_name(&self) -> &'static str {
        "deepspeed"
    }

    #[tracing::instrument(skip(self, client, request), fields(engine = "deepspeed"))]
    async fn generate(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        let start = std::time::Instant::now();
        let url = join_url(&self.base_url, "/query");
        let resp = client
            .post(url)
            .json(&json!({
                "prompts": [Self::prompt_of(request)],
                "max_new_tokens": request.max_tokens,
                "temperature": request.temperature,
                "top_p": request.top_p,
            }))
            .send()
            .await
            .map_err(|e| classify_transport_error("deepspeed", &e))?;
        let resp = check_http_status("deepspeed", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("deepspeed bad body: {e}")))?;

        let output_text = body["responses"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
            .map(str::to_owned);

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: "deepspeed".into(),
            output_text,
            embedding_vector: None,
            token_counts: TokenCounts::default(),
            latency_ms: start.elapsed().as_millis() as u64,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn stream(
        &self,
        _client: &reqwest::Client,
        _request: &InferenceRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        // DeepSpeed-MII's HTTP gateway has no streaming endpoint; callers
        // that need streaming against this family should not declare the
        // Stream capability for it in configuration.
        Err(OrchestratorError::ClientError(
            "deepspeed adapter does not support streaming".into(),
        ))
    }

    async fn health_check(&self, client: &reqwest::Client, probe_path: &str) -> AdapterHealth {
        let url = join_url(&self.base_url, probe_path);
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => AdapterHealth::Healthy,
            Ok(resp) => AdapterHealth::Unhealthy(format!("status {}", resp.status())),
            Err(e) => AdapterHealth::Unhealthy(e.to_string()),
        }
    }

    async fn list_models(&self, _client: &reqwest::Client) -> Result<Vec<String>> {
        // A DeepSpeed-MII deployment serves exactly one model per process;
        // there is no list endpoint to query.
        Ok(Vec::new())
    }
}
