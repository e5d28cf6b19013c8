//! Inference worker: executes submitted jobs asynchronously with
//! priority, expiry, and cancellation, grounded on a semaphore-gated
//! task-pool shape adapted to priority sub-queues.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{OrchestratorError, Result};
use crate::manager::EngineManager;
use crate::model::{InferenceRequest, InferenceResponse};

/// Job priority; HIGH strictly preempts NORMAL/LOW at dequeue time.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

/// A job's lifecycle state. Terminal states are final; no state is
/// revisited (I3).
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::Expired
        )
    }
}

/// An asynchronously executed inference request. The worker exclusively
/// owns mutation; callers observe a cloned snapshot.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: Uuid,
    pub priority: Priority,
    pub request: InferenceRequest,
    pub state: JobState,
    pub submitted_at: Instant,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub result: Option<InferenceResponse>,
    pub error: Option<OrchestratorError>,
    cancel_signal: CancellationToken,
}

/// Filter applied by [`InferenceWorker::list`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub priority: Option<Priority>,
    pub submitted_after: Option<Instant>,
    /// Number of matching jobs to skip, ordered by `submitted_at`.
    pub offset: usize,
    /// Max jobs to return after `offset`. `None` returns every remaining
    /// match.
    pub limit: Option<usize>,
}

impl JobFilter {
    fn matches(&self, job: &Job) -> bool {
        if let Some(state) = &self.state {
            if &job.state != state {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if job.priority != priority {
                return false;
            }
        }
        if let Some(after) = self.submitted_after {
            if job.submitted_at <= after {
                return false;
            }
        }
        true
    }
}

/// The outcome of a cancel request.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyTerminal,
}

struct Queues {
    high: VecDeque<Uuid>,
    normal: VecDeque<Uuid>,
    low: VecDeque<Uuid>,
}

impl Queues {
    fn new() -> Self {
        Self {
            high: VecDeque::new(),
            normal: VecDeque::new(),
            low: VecDeque::new(),
        }
    }

    fn push(&mut self, priority: Priority, job_id: Uuid) {
        match priority {
            Priority::High => self.high.push_back(job_id),
            Priority::Normal => self.normal.push_back(job_id),
            Priority::Low => self.low.push_back(job_id),
        }
    }

    fn pop(&mut self) -> Option<Uuid> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn len(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high.len(),
            Priority::Normal => self.normal.len(),
            Priority::Low => self.low.len(),
        }
    }
}

struct State {
    jobs: HashMap<Uuid, Job>,
    queues: Queues,
}

/// Priority job queue with lifecycle, expiry, stale cleanup, and
/// retention purge, draining itself through a bounded set of worker
/// tasks that invoke the manager's synchronous dispatch path.
pub struct InferenceWorker {
    state: Mutex<State>,
    notify: Notify,
    config: WorkerConfig,
    manager: Arc<EngineManager>,
}

impl InferenceWorker {
    pub fn new(manager: Arc<EngineManager>, config: WorkerConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                jobs: HashMap::new(),
                queues: Queues::new(),
            }),
            notify: Notify::new(),
            config,
            manager,
        })
    }

    /// Never blocks beyond queue insertion; fails with `QueueFull` once
    /// the priority's absolute cap is reached.
    pub async fn submit(&self, request: InferenceRequest, priority: Priority) -> Result<Uuid> {
        let mut state = self.state.lock().await;
        if state.queues.len(priority) >= self.config.queue_capacity_per_priority {
            return Err(OrchestratorError::QueueFull);
        }

        let job_id = Uuid::new_v4();
        let job = Job {
            job_id,
            priority,
            request,
            state: JobState::Pending,
            submitted_at: Instant::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            cancel_signal: CancellationToken::new(),
        };
        state.jobs.insert(job_id, job);
        state.queues.push(priority, job_id);
        drop(state);
        self.notify.notify_one();
        Ok(job_id)
    }

    pub async fn status(&self, job_id: Uuid) -> Result<Job> {
        let state = self.state.lock().await;
        state.jobs.get(&job_id).cloned().ok_or(OrchestratorError::NotFound)
    }

    /// Sets the job's cancel signal; the actual state transition occurs
    /// at the job's next observation point (dequeue, or the in-flight
    /// manager call noticing cancellation). Idempotent: a second call
    /// after the job is already terminal returns `AlreadyTerminal`.
    pub async fn cancel(&self, job_id: Uuid) -> Result<CancelOutcome> {
        let state = self.state.lock().await;
        let job = state.jobs.get(&job_id).ok_or(OrchestratorError::NotFound)?;
        if job.state.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        job.cancel_signal.cancel();
        Ok(CancelOutcome::Cancelled)
    }

    /// Paginated, read-only: matches are ordered by `submitted_at` before
    /// `offset`/`limit` are applied, so pages are stable across calls
    /// even though the backing job map has no inherent order.
    pub async fn list(&self, filter: JobFilter) -> Vec<Job> {
        let state = self.state.lock().await;
        let mut matched: Vec<Job> = state.jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        matched.sort_by_key(|j| j.submitted_at);
        matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Spawns `worker.concurrency` dequeue loops plus the stale-cleanup
    /// and retention-purge background tasks.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        for _ in 0..self.config.concurrency {
            let worker = Arc::clone(&self);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { worker.dequeue_loop(cancel).await }));
        }
        let stale = Arc::clone(&self);
        let stale_cancel = cancel.clone();
        handles.push(tokio::spawn(async move { stale.stale_cleanup_loop(stale_cancel).await }));
        let purge = Arc::clone(&self);
        handles.push(tokio::spawn(async move { purge.retention_purge_loop(cancel).await }));
        handles
    }

    async fn dequeue_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let next = {
                let mut state = self.state.lock().await;
                state.queues.pop()
            };

            let Some(job_id) = next else {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = self.notify.notified() => continue,
                }
            };

            if cancel.is_cancelled() {
                return;
            }

            self.execute(job_id).await;
        }
    }

    async fn execute(&self, job_id: Uuid) {
        let expiry_window = Duration::from_secs(self.config.expiry_window_secs);

        let (request, cancel_signal) = {
            let mut state = self.state.lock().await;
            let Some(job) = state.jobs.get_mut(&job_id) else {
                return;
            };

            if job.cancel_signal.is_cancelled() {
                job.state = JobState::Cancelled;
                job.finished_at = Some(Instant::now());
                return;
            }

            if job.submitted_at.elapsed() > expiry_window {
                job.state = JobState::Expired;
                job.finished_at = Some(Instant::now());
                return;
            }

            job.state = JobState::Running;
            job.started_at = Some(Instant::now());
            (job.request.clone(), job.cancel_signal.clone())
        };

        let outcome = self.manager.generate(&request, &cancel_signal).await;

        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return;
        };
        // The stale-cleanup loop may have already forced this job to a
        // terminal state (and triggered cancel_signal) while `generate`
        // was still unwinding; don't clobber that terminal write.
        if job.state.is_terminal() {
            return;
        }
        job.finished_at = Some(Instant::now());
        match outcome {
            Ok(response) => {
                job.state = JobState::Succeeded;
                job.result = Some(response);
            }
            Err(OrchestratorError::Cancelled) => {
                job.state = JobState::Cancelled;
            }
            Err(e) => {
                job.state = JobState::Failed;
                job.error = Some(e);
            }
        }
    }

    async fn stale_cleanup_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        let stale_threshold = Duration::from_secs(self.config.stale_threshold_secs);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {
                    let mut state = self.state.lock().await;
                    for job in state.jobs.values_mut() {
                        if job.state != JobState::Running {
                            continue;
                        }
                        let Some(started_at) = job.started_at else { continue };
                        if started_at.elapsed() > stale_threshold {
                            tracing::warn!(job_id = %job.job_id, "forcing stale job to failed");
                            job.cancel_signal.cancel();
                            job.state = JobState::Failed;
                            job.error = Some(OrchestratorError::Internal("stale".to_string()));
                            job.finished_at = Some(Instant::now());
                        }
                    }
                }
            }
        }
    }

    async fn retention_purge_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        let retention_window = Duration::from_secs(self.config.retention_window_secs);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {
                    let mut state = self.state.lock().await;
                    state.jobs.retain(|_, job| {
                        match job.finished_at {
                            Some(finished_at) if job.state.is_terminal() => {
                                finished_at.elapsed() <= retention_window
                            }
                            _ => true,
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_drain_high_before_normal_before_low() {
        let mut queues = Queues::new();
        let n1 = Uuid::new_v4();
        let n2 = Uuid::new_v4();
        let l1 = Uuid::new_v4();
        let h1 = Uuid::new_v4();
        queues.push(Priority::Normal, n1);
        queues.push(Priority::Normal, n2);
        queues.push(Priority::Low, l1);
        queues.push(Priority::High, h1);

        assert_eq!(queues.pop(), Some(h1));
        assert_eq!(queues.pop(), Some(n1));
        assert_eq!(queues.pop(), Some(n2));
        assert_eq!(queues.pop(), Some(l1));
        assert_eq!(queues.pop(), None);
    }

    #[test]
    fn job_filter_matches_state_and_priority() {
        let job = Job {
            job_id: Uuid::new_v4(),
            priority: Priority::High,
            request: sample_request(),
            state: JobState::Succeeded,
            submitted_at: Instant::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            cancel_signal: CancellationToken::new(),
        };
        let filter = JobFilter {
            state: Some(JobState::Succeeded),
            priority: Some(Priority::High),
            submitted_after: None,
            offset: 0,
            limit: None,
        };
        assert!(filter.matches(&job));

        let mismatched = JobFilter {
            state: Some(JobState::Failed),
            ..Default::default()
        };
        assert!(!mismatched.matches(&job));
    }

    fn sample_request() -> InferenceRequest {
        InferenceRequest {
            model_id: "m1".to_string(),
            messages: vec![],
            prompt: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stop: vec![],
            stream: false,
            embedding_input: vec![],
            trace_id: "t1".to_string(),
        }
    }
}
