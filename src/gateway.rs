//! Construction-time-assembled dependency graph: the single type a
//! caller constructs and holds, exposing the inbound operations as
//! inherent async methods.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapter::deepspeed::DeepSpeedAdapter;
use crate::adapter::lmdeploy::LmDeployAdapter;
use crate::adapter::ollama::OllamaAdapter;
use crate::adapter::sglang::SglangAdapter;
use crate::adapter::tensorrt::TensorRtAdapter;
use crate::adapter::tgi::TgiAdapter;
use crate::adapter::vllm::VllmAdapter;
use crate::adapter::EngineAdapter;
use crate::breaker::CircuitBreaker;
use crate::config::{EngineConfig, GatewayConfig};
use crate::error::{OrchestratorError, Result};
use crate::manager::{EngineManager, ManagedEngine};
use crate::model::{EngineEndpoint, EngineFamily, EngineIdentity, InferenceRequest, InferenceResponse, StreamChunk};
use crate::monitor::{HealthMonitor, HealthSnapshot};
use crate::pool::ConnectionPool;
use crate::registry::ModelRegistry;
use crate::worker::{CancelOutcome, InferenceWorker, Job, JobFilter, Priority};

fn build_adapter(family: EngineFamily, endpoint: &EngineEndpoint) -> Box<dyn EngineAdapter> {
    match family {
        EngineFamily::Vllm => Box::new(VllmAdapter::new(endpoint.base_url.clone())),
        EngineFamily::Tgi => Box::new(TgiAdapter::new(endpoint.base_url.clone())),
        EngineFamily::Ollama => Box::new(OllamaAdapter::new(endpoint.base_url.clone())),
        EngineFamily::Sglang => Box::new(SglangAdapter::new(endpoint.base_url.clone())),
        EngineFamily::TensorRtLlm => {
            Box::new(TensorRtAdapter::new(endpoint.base_url.clone(), endpoint.identity.to_string()))
        }
        EngineFamily::DeepSpeedMii => Box::new(DeepSpeedAdapter::new(endpoint.base_url.clone())),
        EngineFamily::LmDeploy => Box::new(LmDeployAdapter::new(endpoint.base_url.clone())),
    }
}

fn endpoint_from_config(config: &EngineConfig) -> EngineEndpoint {
    EngineEndpoint {
        identity: EngineIdentity::new(config.identity.clone()),
        family: config.family,
        base_url: config.base_url.clone(),
        declared_capabilities: config.capabilities.iter().copied().collect::<BTreeSet<_>>(),
        probe_path: config.probe_path.clone(),
    }
}

/// Builds a [`Gateway`] by constructing one pool + breaker + adapter per
/// configured engine, seeding the registry, and spawning the monitor and
/// worker background tasks.
pub struct GatewayBuilder {
    config: GatewayConfig,
    custom_adapters: HashMap<String, Box<dyn EngineAdapter>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            custom_adapters: HashMap::new(),
        }
    }

    /// Registers an already-constructed adapter for the given engine
    /// identity, overriding the family-based dispatch in
    /// [`build_adapter`]. Lets a caller supply a custom engine family
    /// without the manager ever downcasting.
    pub fn register_engine(mut self, identity: impl Into<String>, adapter: Box<dyn EngineAdapter>) -> Self {
        self.custom_adapters.insert(identity.into(), adapter);
        self
    }

    pub fn build(mut self) -> Result<Arc<Gateway>> {
        self.config.validate()?;

        let mut engines = HashMap::new();
        for engine_config in &self.config.engines {
            let endpoint = endpoint_from_config(engine_config);
            let identity = endpoint.identity.clone();
            let adapter = self
                .custom_adapters
                .remove(engine_config.identity.as_str())
                .unwrap_or_else(|| build_adapter(engine_config.family, &endpoint));

            let managed = ManagedEngine {
                endpoint,
                adapter,
                breaker: CircuitBreaker::new(engine_config.breaker.clone()),
                pool: ConnectionPool::new(engine_config.pool.clone()),
            };
            engines.insert(identity, managed);
        }

        let registry = Arc::new(ModelRegistry::new(self.config.models.clone()));
        let manager = Arc::new(EngineManager::new(engines, Arc::clone(&registry)));

        let shutdown = CancellationToken::new();
        let monitor = HealthMonitor::new(Arc::clone(&manager), self.config.monitor.clone());
        let monitor_handle = Arc::clone(&monitor).spawn(shutdown.child_token());

        let worker = InferenceWorker::new(Arc::clone(&manager), self.config.worker.clone());
        let worker_handles = Arc::clone(&worker).spawn(shutdown.child_token());

        Ok(Arc::new(Gateway {
            manager,
            monitor,
            worker,
            shutdown,
            _monitor_handle: monitor_handle,
            _worker_handles: worker_handles,
        }))
    }
}

/// The assembled orchestration core. Owns one pool + breaker per
/// configured engine, the shared model registry, the engine manager, and
/// the monitor/worker background tasks. This is the sole surface a
/// caller is expected to hold.
pub struct Gateway {
    manager: Arc<EngineManager>,
    monitor: Arc<HealthMonitor>,
    worker: Arc<InferenceWorker>,
    shutdown: CancellationToken,
    _monitor_handle: tokio::task::JoinHandle<()>,
    _worker_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Synchronous, non-streaming dispatch.
    pub async fn generate(
        &self,
        request: InferenceRequest,
        cancel_token: CancellationToken,
    ) -> Result<InferenceResponse> {
        self.manager.generate(&request, &cancel_token).await
    }

    /// Streaming dispatch: resolves the preference list exactly as
    /// `generate` does, then hands the caller the first admissible
    /// engine's stream directly (failover mid-stream is not meaningful
    /// once bytes have been sent to the caller).
    pub async fn stream(
        &self,
        request: InferenceRequest,
        cancel_token: CancellationToken,
    ) -> Result<futures::stream::BoxStream<'static, Result<StreamChunk>>> {
        let descriptor = self.manager.registry().resolve(&request.model_id)?;
        for engine_id in &descriptor.engine_preference {
            if cancel_token.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            let Some(engine) = self.manager.engine(engine_id) else {
                continue;
            };
            if !engine.endpoint.supports(crate::model::Capability::Stream) {
                continue;
            }
            if engine.breaker.allow_request() != crate::breaker::Admit::Allowed {
                continue;
            }
            let handle = match engine.pool.acquire() {
                Ok(h) => h,
                Err(_) => {
                    // Saturated before ever reaching the engine: a
                    // half-open probe admitted above has no outcome to
                    // record, so its slot must be released explicitly.
                    engine.breaker.abandon_probe();
                    continue;
                }
            };
            let result = engine.adapter.stream(handle.client(), &request).await;
            match result {
                Ok(stream) => {
                    engine.breaker.record(crate::breaker::Outcome::Ok);
                    return Ok(stream);
                }
                Err(e) => {
                    if e.counts_as_breaker_failure() {
                        engine.breaker.record(crate::breaker::Outcome::Fail);
                    } else {
                        engine.breaker.abandon_probe();
                    }
                    continue;
                }
            }
        }
        Err(OrchestratorError::AllEnginesUnavailable)
    }

    pub async fn embed(&self, request: InferenceRequest, cancel_token: CancellationToken) -> Result<InferenceResponse> {
        self.manager.generate(&request, &cancel_token).await
    }

    pub async fn submit_job(&self, request: InferenceRequest, priority: Priority) -> Result<Uuid> {
        self.worker.submit(request, priority).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        self.worker.status(job_id).await
    }

    pub async fn cancel_job(&self, job_id: Uuid) -> Result<CancelOutcome> {
        self.worker.cancel(job_id).await
    }

    pub async fn list_jobs(&self, filter: JobFilter) -> Vec<Job> {
        self.worker.list(filter).await
    }

    pub async fn health(&self) -> HealthSnapshot {
        self.monitor.snapshot().await
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.manager.registry()
    }

    /// Cancels the monitor and worker background tasks. In-flight probes
    /// and job executions observe the cancellation at their next
    /// suspension point rather than being aborted mid-flight.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
