//! Adapter for vLLM's OpenAI-compatible HTTP API.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;

use super::common::{check_http_status, classify_transport_error, join_url};
use super::{AdapterHealth, EngineAdapter};
use crate::error::{OrchestratorError, Result};
use crate::model::{InferenceRequest, InferenceResponse, StreamChunk, TokenCounts};

pub struct VllmAdapter {
    base_url: String,
}

impl VllmAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn chat_payload(&self, request: &InferenceRequest, stream: bool) -> serde_json::Value {
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
impl EngineAdapter for VllmAdapter {
    fn family_name(&self) -> &'static str {
        "vllm"
    }

    #[tracing::instrument(skip(self, client, request), fields(engine = "vllm"))]
    async fn generate(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        let start = std::time::Instant::now();
        let url = join_url(&self.base_url, "/v1/chat/completions");
        let resp = client
            .post(url)
            .json(&self.chat_payload(request, false))
            .send()
            .await
            .map_err(|e| classify_transport_error("vllm", &e))?;
        let resp = check_http_status("vllm", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("vllm bad body: {e}")))?;

        let choice = body["choices"].get(0).ok_or_else(|| {
            OrchestratorError::Unavailable("vllm response missing choices".into())
        })?;
        let output_text = choice["message"]["content"].as_str().map(str::to_owned);
        let finish_reason = choice["finish_reason"].as_str().map(str::to_owned);
        let token_counts = TokenCounts {
            prompt: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion: body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: "vllm".into(),
            output_text,
            embedding_vector: None,
            token_counts,
            latency_ms: start.elapsed().as_millis() as u64,
            finish_reason,
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
            .json(&self.chat_payload(request, true))
            .send()
            .await
            .map_err(|e| classify_transport_error("vllm", &e))?;
        let resp = check_http_status("vllm", resp).await?;
        parse_openai_sse("vllm", resp)
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
            .map_err(|e| classify_transport_error("vllm", &e))?;
        let resp = check_http_status("vllm", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("vllm bad body: {e}")))?;
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

/// Wraps a chat-completions streaming response's byte stream into
/// [`StreamChunk`]s. Shared by every OpenAI-wire-compatible adapter
/// (vLLM, SGLang, LMDeploy).
pub(super) fn parse_openai_sse(
    engine: &'static str,
    resp: reqwest::Response,
) -> Result<BoxStream<'static, Result<StreamChunk>>> {
    let chunks = resp.bytes_stream().flat_map(move |item| {
        let lines: Vec<Result<StreamChunk>> = match item {
            Ok(bytes) => parse_sse_lines(&bytes),
            Err(e) => vec![Err(classify_transport_error(engine, &e))],
        };
        futures::stream::iter(lines)
    });
    Ok(Box::pin(chunks))
}

/// Parses one SSE chunk of `data: {...}` lines into stream chunks,
/// terminating on the `[DONE]` sentinel.
fn parse_sse_lines(bytes: &[u8]) -> Vec<Result<StreamChunk>> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();
    for line in text.lines() {
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        if data == "[DONE]" {
            out.push(Ok(StreamChunk {
                delta: String::new(),
                finished: true,
                token_counts: None,
                finish_reason: None,
            }));
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(data) {
            Ok(v) => {
                let delta = v["choices"][0]["delta"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let finish_reason = v["choices"][0]["finish_reason"].as_str().map(str::to_owned);
                let finished = finish_reason.is_some();
                out.push(Ok(StreamChunk {
                    delta,
                    finished,
                    token_counts: None,
                    finish_reason,
                }));
            }
            Err(e) => out.push(Err(OrchestratorError::Unavailable(format!(
                "vllm malformed sse chunk: {e}"
            )))),
        }
    }
    out
}
