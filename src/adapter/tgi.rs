//! Adapter for Hugging Face Text Generation Inference (TGI).

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;

use super::common::{check_http_status, classify_transport_error, join_url};
use super::{AdapterHealth, EngineAdapter};
use crate::error::{OrchestratorError, Result};
use crate::model::{InferenceRequest, InferenceResponse, StreamChunk, TokenCounts};

pub struct TgiAdapter {
    base_url: String,
}

impl TgiAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn prompt_of(request: &InferenceRequest) -> String {
        if let Some(p) = &request.prompt {
            p.clone()
        } else {
            request
                .messages
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }

    fn payload(&self, request: &InferenceRequest, stream: bool) -> serde_json::Value {
        json!({
            "inputs": Self::prompt_of(request),
            "parameters": {
                "max_new_tokens": request.max_tokens,
                "temperature": request.temperature,
                "top_p": request.top_p,
                "stop": request.stop,
            },
            "stream": stream,
        })
    }
}

#[async_trait]
impl EngineAdapter for TgiAdapter {
    fn family_name(&self) -> &'static str {
        "tgi"
    }

    #[tracing::instrument(skip(self, client, request), fields(engine = "tgi"))]
    async fn generate(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        let start = std::time::Instant::now();
        let url = join_url(&self.base_url, "/generate");
        let resp = client
            .post(url)
            .json(&self.payload(request, false))
            .send()
            .await
            .map_err(|e| classify_transport_error("tgi", &e))?;
        let resp = check_http_status("tgi", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("tgi bad body: {e}")))?;

        let output_text = body["generated_text"].as_str().map(str::to_owned);
        let completion_tokens = body["details"]["generated_tokens"].as_u64().unwrap_or(0) as u32;
        let finish_reason = body["details"]["finish_reason"].as_str().map(str::to_owned);

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: "tgi".into(),
            output_text,
            embedding_vector: None,
            token_counts: TokenCounts {
                prompt: 0,
                completion: completion_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
            finish_reason,
        })
    }

    async fn stream(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let url = join_url(&self.base_url, "/generate_stream");
        let resp = client
            .post(url)
            .json(&self.payload(request, true))
            .send()
            .await
            .map_err(|e| classify_transport_error("tgi", &e))?;
        let resp = check_http_status("tgi", resp).await?;

        let chunks = resp.bytes_stream().flat_map(|item| {
            let parsed: Vec<Result<StreamChunk>> = match item {
                Ok(bytes) => parse_tgi_sse(&bytes),
                Err(e) => vec![Err(classify_transport_error("tgi", &e))],
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
        let url = join_url(&self.base_url, "/info");
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error("tgi", &e))?;
        let resp = check_http_status("tgi", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("tgi bad body: {e}")))?;
        Ok(body["model_id"]
            .as_str()
            .map(|s| vec![s.to_string()])
            .unwrap_or_default())
    }
}

fn parse_tgi_sse(bytes: &[u8]) -> Vec<Result<StreamChunk>> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();
    for line in text.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        match serde_json::from_str::<serde_json::Value>(data.trim()) {
            Ok(v) => {
                let delta = v["token"]["text"].as_str().unwrap_or_default().to_string();
                let finished = v["generated_text"].is_string();
                let finish_reason = v["details"]["finish_reason"].as_str().map(str::to_owned);
                out.push(Ok(StreamChunk {
                    delta,
                    finished,
                    token_counts: None,
                    finish_reason,
                }));
            }
            Err(e) => out.push(Err(OrchestratorError::Unavailable(format!(
                "tgi malformed sse chunk: {e}"
            )))),
        }
    }
    out
}
