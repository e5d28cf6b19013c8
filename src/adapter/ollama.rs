//! Adapter for Ollama's native HTTP API.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;

use super::common::{check_http_status, classify_transport_error, join_url};
use super::{AdapterHealth, EngineAdapter};
use crate::error::{OrchestratorError, Result};
use crate::model::{InferenceRequest, InferenceResponse, StreamChunk, TokenCounts};

pub struct OllamaAdapter {
    base_url: String,
}

impl OllamaAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn payload(&self, request: &InferenceRequest, stream: bool) -> serde_json::Value {
        json!({
            "model": request.model_id,
            "messages": request.messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
            "stream": stream,
            "options": {
                "temperature": request.temperature,
                "top_p": request.top_p,
                "num_predict": request.max_tokens,
                "stop": request.stop,
            }
        })
    }
}

#[async_trait]
impl EngineAdapter for OllamaAdapter {
    fn family_name(&self) -> &'static str {
        "ollama"
    }

    #[tracing::instrument(skip(self, client, request), fields(engine = "ollama"))]
    async fn generate(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        let start = std::time::Instant::now();
        let url = join_url(&self.base_url, "/api/chat");
        let resp = client
            .post(url)
            .json(&self.payload(request, false))
            .send()
            .await
            .map_err(|e| classify_transport_error("ollama", &e))?;
        let resp = check_http_status("ollama", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("ollama bad body: {e}")))?;

        let output_text = body["message"]["content"].as_str().map(str::to_owned);
        let finish_reason = if body["done"].as_bool().unwrap_or(false) {
            Some("stop".to_string())
        } else {
            None
        };

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: "ollama".into(),
            output_text,
            embedding_vector: None,
            token_counts: TokenCounts {
                prompt: body["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
                completion: body["eval_count"].as_u64().unwrap_or(0) as u32,
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
        let url = join_url(&self.base_url, "/api/chat");
        let resp = client
            .post(url)
            .json(&self.payload(request, true))
            .send()
            .await
            .map_err(|e| classify_transport_error("ollama", &e))?;
        let resp = check_http_status("ollama", resp).await?;

        // Ollama streams newline-delimited JSON objects, not SSE.
        let chunks = resp.bytes_stream().flat_map(|item| {
            let parsed: Vec<Result<StreamChunk>> = match item {
                Ok(bytes) => parse_ndjson(&bytes),
                Err(e) => vec![Err(classify_transport_error("ollama", &e))],
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
        let url = join_url(&self.base_url, "/api/tags");
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error("ollama", &e))?;
        let resp = check_http_status("ollama", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("ollama bad body: {e}")))?;
        Ok(body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn embeddings(
        &self,
        client: &reqwest::Client,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        let start = std::time::Instant::now();
        let url = join_url(&self.base_url, "/api/embed");
        let resp = client
            .post(url)
            .json(&json!({"model": request.model_id, "input": request.embedding_input}))
            .send()
            .await
            .map_err(|e| classify_transport_error("ollama", &e))?;
        let resp = check_http_status("ollama", resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("ollama bad body: {e}")))?;
        let vector = body["embeddings"][0]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect());

        Ok(InferenceResponse {
            model_id: request.model_id.clone(),
            engine_used: "ollama".into(),
            output_text: None,
            embedding_vector: vector,
            token_counts: TokenCounts::default(),
            latency_ms: start.elapsed().as_millis() as u64,
            finish_reason: None,
        })
    }
}

fn parse_ndjson(bytes: &[u8]) -> Vec<Result<StreamChunk>> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(v) => {
                let delta = v["message"]["content"].as_str().unwrap_or_default().to_string();
                let finished = v["done"].as_bool().unwrap_or(false);
                out.push(Ok(StreamChunk {
                    delta,
                    finished,
                    token_counts: finished.then(|| TokenCounts {
                        prompt: v["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
                        completion: v["eval_count"].as_u64().unwrap_or(0) as u32,
                    }),
                    finish_reason: finished.then(|| "stop".to_string()),
                }));
            }
            Err(e) => out.push(Err(OrchestratorError::Unavailable(format!(
                "ollama malformed ndjson chunk: {e}"
            )))),
        }
    }
    out
}
