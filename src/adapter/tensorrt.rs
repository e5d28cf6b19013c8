//! Adapter for NVIDIA Triton Inference Server fronting a TensorRT-LLM
//! backend, using Triton's generate endpoint (KServe v2 extension).

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;

use super::common::{check_http_status, classify_transport_error, join_url};
use super::{AdapterHealth, EngineAdapter};
use crate::error::{OrchestratorError, Result};
use crate::model::{InferenceRequest, InferenceResponse, StreamChunk, TokenCounts};

pub struct TensorRtAdapter {
    base_url: String,
    model_name: String,
}

impl TensorRtAdapter {
    pub fn new(base_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model_name: model_name.into(),
        }
    }

    fn prompt_of(request: &InferenceRequest) -> String {
        request
            .prompt
            .clone()
            .unwrap_or_else(|| request.messages.iter().map(|m| m.content.clone()).collect::<Vec<_>>().join("\n"))
    }

    fn generate_path(&self, streaming: bool) -> String {
        let suffix = if streaming { "generate_stream" } else { "generate" };
        format!("/v2/models/{}/{suffix}", self.model_name)
    }

    fn payload(&self, request: &InferenceRequest) -> serde_json::Value {
        json!({
            "text_input": Self::prompt_of(request),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stop_words": request.stop,
        })
    }
}

#[async_trait]
impl EngineAdapter for TensorRtAdapter {
    fn family_name(&self) -> &'static str {
        "tensorrt"
    }

    #[tracing::instrument(skip(self, client, request), fields(engine = "tensorrt"))]
    async fn generate(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        let start = std::time::Instant::now();
        let url = join_url(&self.base_url, &self.generate_path(false));
        let resp = client
            .post(url)
            .json(&self.payload(request))
            .send()
            .await
            .map_err(|e| classify_transport_error("tensorrt", &e))?;
        let resp = check_http_status("tensorrt", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("tensorrt bad body: {e}")))?;

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: "tensorrt".into(),
            output_text: body["text_output"].as_str().map(str::to_owned),
            embedding_vector: None,
            token_counts: TokenCounts::default(),
            latency_ms: start.elapsed().as_millis() as u64,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn stream(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let url = join_url(&self.base_url, &self.generate_path(true));
        let resp = client
            .post(url)
            .json(&self.payload(request))
            .send()
            .await
            .map_err(|e| classify_transport_error("tensorrt", &e))?;
        let resp = check_http_status("tensorrt", resp).await?;

        let chunks = resp.bytes_stream().flat_map(|item| {
            let parsed: Vec<Result<StreamChunk>> = match item {
                Ok(bytes) => parse_triton_sse(&bytes),
                Err(e) => vec![Err(classify_transport_error("tensorrt", &e))],
            };
            futures::stream::iter(parsed)
        });
        Ok(Box::pin(chunks))
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
        let url = join_url(&self.base_url, "/v2/models/stats");
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error("tensorrt", &e))?;
        let resp = check_http_status("tensorrt", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("tensorrt bad body: {e}")))?;
        Ok(body["model_stats"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn parse_triton_sse(bytes: &[u8]) -> Vec<Result<StreamChunk>> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();
    for line in text.lines() {
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        match serde_json::from_str::<serde_json::Value>(data) {
            Ok(v) => {
                let delta = v["text_output"].as_str().unwrap_or_default().to_string();
                out.push(Ok(StreamChunk {
                    delta,
                    finished: false,
                    token_counts: None,
                    finish_reason: None,
                }));
            }
            Err(e) => out.push(Err(OrchestratorError::Unavailable(format!(
                "tensorrt malformed sse chunk: {e}"
            )))),
        }
    }
    out
}
