//! Engine manager: the synchronous entry point for all inference work.
//! Resolves a model to its preference list, filters by capability, and
//! tries candidates in order with per-engine breaker admission and pool
//! acquisition, failing over on retryable errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::adapter::EngineAdapter;
use crate::breaker::{Admit, CircuitBreaker, Outcome};
use crate::error::{OrchestratorError, Result};
use crate::model::{EngineEndpoint, EngineIdentity, InferenceRequest, InferenceResponse};
use crate::pool::ConnectionPool;
use crate::registry::ModelRegistry;

const MAX_ATTEMPTS_CAP: usize = 3;

/// One configured engine's full runtime state: its static endpoint
/// description, its adapter, its breaker, and its pool. Held by identity;
/// the manager never downcasts.
pub struct ManagedEngine {
    pub endpoint: EngineEndpoint,
    pub adapter: Box<dyn EngineAdapter>,
    pub breaker: CircuitBreaker,
    pub pool: ConnectionPool,
}

/// Per-candidate outcome recorded for observability, mirroring the
/// manager's selection algorithm's bookkeeping.
#[derive(Debug, Clone, Eq, PartialEq)]
enum AttemptOutcome {
    SkippedBreaker,
    SkippedSaturated,
    Failed,
    ClientError,
}

/// Owns every configured engine and the shared model registry; the
/// single synchronous dispatch point every caller and the worker go
/// through.
pub struct EngineManager {
    engines: HashMap<EngineIdentity, ManagedEngine>,
    registry: Arc<ModelRegistry>,
}

impl EngineManager {
    pub fn new(engines: HashMap<EngineIdentity, ManagedEngine>, registry: Arc<ModelRegistry>) -> Self {
        Self { engines, registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn engine(&self, id: &EngineIdentity) -> Option<&ManagedEngine> {
        self.engines.get(id)
    }

    pub fn engine_ids(&self) -> impl Iterator<Item = &EngineIdentity> {
        self.engines.keys()
    }

    /// Runs the selection algorithm: resolve, filter by capability, try
    /// each candidate in order until one succeeds, a 4xx is returned
    /// directly, or candidates are exhausted.
    #[tracing::instrument(skip(self, request, cancel), fields(model_id = %request.model_id))]
    pub async fn generate(
        &self,
        request: &InferenceRequest,
        cancel: &CancellationToken,
    ) -> Result<InferenceResponse> {
        let descriptor = self.registry.resolve(&request.model_id)?;
        let capability = request.required_capability();

        let candidates: Vec<&EngineIdentity> = descriptor
            .engine_preference
            .iter()
            .filter(|id| {
                self.engines
                    .get(*id)
                    .is_some_and(|e| e.endpoint.supports(capability))
            })
            .collect();

        if candidates.is_empty() {
            return Err(OrchestratorError::AllEnginesUnavailable);
        }

        let max_attempts = candidates.len().min(MAX_ATTEMPTS_CAP);

        for engine_id in candidates.into_iter().take(max_attempts) {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            let Some(engine) = self.engines.get(engine_id) else {
                continue;
            };

            match self.try_engine(engine, engine_id, request, capability, cancel).await {
                Ok(response) => return Ok(response),
                Err(AttemptResult::ClientError(e)) => return Err(e),
                Err(AttemptResult::Retry) => continue,
            }
        }

        Err(OrchestratorError::AllEnginesUnavailable)
    }

    async fn try_engine(
        &self,
        engine: &ManagedEngine,
        engine_id: &EngineIdentity,
        request: &InferenceRequest,
        capability: crate::model::Capability,
        cancel: &CancellationToken,
    ) -> std::result::Result<InferenceResponse, AttemptResult> {
        use crate::model::Capability;

        if engine.breaker.allow_request() == Admit::Denied {
            metrics::counter!("manager.skipped_breaker", "engine" => engine_id.to_string())
                .increment(1);
            self.log_skip(engine_id, AttemptOutcome::SkippedBreaker);
            return Err(AttemptResult::Retry);
        }

        let handle = match engine.pool.acquire() {
            Ok(h) => h,
            Err(OrchestratorError::Saturated) => {
                // A half-open probe admitted by allow_request above would
                // otherwise wedge in HALF_OPEN forever: it never reached
                // the engine, so there is no outcome to record().
                engine.breaker.abandon_probe();
                metrics::counter!("manager.skipped_saturated", "engine" => engine_id.to_string())
                    .increment(1);
                self.log_skip(engine_id, AttemptOutcome::SkippedSaturated);
                return Err(AttemptResult::Retry);
            }
            Err(e) => {
                engine.breaker.abandon_probe();
                return Err(AttemptResult::ClientError(e));
            }
        };

        let start = Instant::now();
        let attempt_timeout = engine.pool.request_timeout();

        let dispatch = async {
            match capability {
                Capability::Embed => engine.adapter.embeddings(handle.client(), request).await,
                _ => engine.adapter.generate(handle.client(), request).await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                drop(handle);
                engine.breaker.abandon_probe();
                return Err(AttemptResult::ClientError(OrchestratorError::Cancelled));
            }
            res = tokio::time::timeout(attempt_timeout, dispatch) => res,
        };

        drop(handle);

        match outcome {
            Ok(Ok(mut response)) => {
                engine.breaker.record(Outcome::Ok);
                response.engine_used = engine_id.clone();
                response.latency_ms = start.elapsed().as_millis() as u64;
                metrics::counter!("manager.requests_ok", "engine" => engine_id.to_string())
                    .increment(1);
                metrics::histogram!("manager.dispatch_latency_ms", "engine" => engine_id.to_string())
                    .record(response.latency_ms as f64);
                Ok(response)
            }
            Ok(Err(e @ OrchestratorError::ClientError(_))) => {
                // A 4xx never counts as a breaker failure (I5), but a
                // half-open probe still needs its slot released.
                engine.breaker.abandon_probe();
                self.log_skip(engine_id, AttemptOutcome::ClientError);
                Err(AttemptResult::ClientError(e))
            }
            Ok(Err(e)) => {
                if e.counts_as_breaker_failure() {
                    engine.breaker.record(Outcome::Fail);
                } else {
                    engine.breaker.abandon_probe();
                }
                metrics::counter!("manager.requests_err", "engine" => engine_id.to_string())
                    .increment(1);
                self.log_skip(engine_id, AttemptOutcome::Failed);
                Err(AttemptResult::Retry)
            }
            Err(_elapsed) => {
                engine.breaker.record(Outcome::Fail);
                metrics::counter!("manager.requests_timeout", "engine" => engine_id.to_string())
                    .increment(1);
                self.log_skip(engine_id, AttemptOutcome::Failed);
                Err(AttemptResult::Retry)
            }
        }
    }

    fn log_skip(&self, engine_id: &EngineIdentity, outcome: AttemptOutcome) {
        tracing::debug!(engine = %engine_id, ?outcome, "candidate attempt did not succeed");
    }
}

enum AttemptResult {
    Retry,
    ClientError(OrchestratorError),
}
