//! Normalized data model shared by every component: engine identity and
//! endpoint description, model descriptors, and the request/response
//! shapes that cross the adapter boundary.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// An interned, cheaply-cloneable tag naming one configured engine
/// instance. Partition key across all per-engine state (pool, breaker,
/// metrics). Free-form data rather than a closed enum: the roster is
/// configured at startup, not compiled in.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineIdentity(Arc<str>);

impl EngineIdentity {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EngineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineIdentity({})", self.0)
    }
}

impl From<&str> for EngineIdentity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EngineIdentity {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// The wire-protocol family an engine speaks. Used only to pick which
/// [`crate::adapter::EngineAdapter`] implementation to construct for an
/// endpoint; it is not part of the engine's identity.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFamily {
    Vllm,
    Tgi,
    Ollama,
    Sglang,
    TensorRtLlm,
    DeepSpeedMii,
    LmDeploy,
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Vllm => "vllm",
            Self::Tgi => "tgi",
            Self::Ollama => "ollama",
            Self::Sglang => "sglang",
            Self::TensorRtLlm => "tensorrt",
            Self::DeepSpeedMii => "deepspeed",
            Self::LmDeploy => "lmdeploy",
        };
        f.write_str(s)
    }
}

/// A capability an engine or model may declare.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Generate,
    Stream,
    Embed,
    ListModels,
}

/// An engine instance's static configuration. Created at startup, never
/// mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEndpoint {
    pub identity: EngineIdentity,
    pub family: EngineFamily,
    pub base_url: String,
    pub declared_capabilities: BTreeSet<Capability>,
    /// Path probed by the health monitor, e.g. `/health` or `/v1/models`.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
}

pub(crate) fn default_probe_path() -> String {
    "/health".to_string()
}

impl EngineEndpoint {
    pub fn supports(&self, cap: Capability) -> bool {
        self.declared_capabilities.contains(&cap)
    }
}

/// A logical model id mapped onto an ordered list of engines eligible to
/// serve it. Registered at startup or via the registry's admin path; may
/// be retired (soft-deleted, rejected for new requests) without affecting
/// in-flight work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub engine_preference: Vec<EngineIdentity>,
    pub capability_set: BTreeSet<Capability>,
    pub quantization_tag: Option<String>,
    #[serde(default)]
    pub retired: bool,
}

/// A single chat/completion message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// A normalized inference request. Immutable once it enters the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub model_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub embedding_input: Vec<String>,
    pub trace_id: String,
}

impl InferenceRequest {
    /// The [`Capability`] this request requires, for registry/adapter
    /// routing purposes.
    pub fn required_capability(&self) -> Capability {
        if !self.embedding_input.is_empty() {
            Capability::Embed
        } else if self.stream {
            Capability::Stream
        } else {
            Capability::Generate
        }
    }
}

/// Prompt/completion token counts reported by an engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenCounts {
    pub prompt: u32,
    pub completion: u32,
}

/// A normalized inference response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub model_id: String,
    pub engine_used: EngineIdentity,
    pub output_text: Option<String>,
    pub embedding_vector: Option<Vec<f32>>,
    pub token_counts: TokenCounts,
    pub latency_ms: u64,
    pub finish_reason: Option<String>,
}

/// One chunk of a streamed generation, plus an optional final usage
/// record on the terminal chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub finished: bool,
    pub token_counts: Option<TokenCounts>,
    pub finish_reason: Option<String>,
}
