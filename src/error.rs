//! Error types for the engine orchestration core.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Unified error type covering configuration, dispatch, and transport
/// failures across the orchestration core.
///
/// Variants are intentionally coarse-grained so that callers can match on
/// error *category* (e.g. retryable vs permanent) rather than on
/// engine-specific details. Maps onto the error taxonomy in the design
/// document.
#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    /// Invalid or missing startup configuration (bad roster, unknown
    /// engine referenced by a model's preference list, non-positive
    /// timeout, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine returned a 4xx response: a terminal, non-retryable
    /// failure that does not count against the breaker.
    #[error("Client error: {0}")]
    ClientError(String),

    /// The pool's concurrency cap for the chosen engine was reached.
    #[error("Saturated")]
    Saturated,

    /// Every candidate engine for this request was denied, saturated, or
    /// failed.
    #[error("All engines unavailable")]
    AllEnginesUnavailable,

    /// The whole-request deadline, or a per-attempt timeout, elapsed.
    #[error("Timeout")]
    Timeout,

    /// The caller or a job's cancel signal was observed.
    #[error("Cancelled")]
    Cancelled,

    /// The worker's queue for the requested priority is at capacity.
    #[error("Queue full")]
    QueueFull,

    /// The requested job_id is not known (never existed, or was purged
    /// after its retention window).
    #[error("Not found")]
    NotFound,

    /// A transport or protocol-level error communicating with an engine
    /// (5xx, connection reset, malformed body). Retryable and counts
    /// against the breaker.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// Unexpected invariant violation. Fatal to the affected request but
    /// never to the process.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Returns `true` for transient errors that may succeed against a
    /// different engine or after the breaker recovers:
    /// [`Saturated`](Self::Saturated), [`Timeout`](Self::Timeout), and
    /// [`Unavailable`](Self::Unavailable).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Saturated | Self::Timeout | Self::Unavailable(_))
    }

    /// Returns `true` when this error should count as a circuit breaker
    /// failure. 4xx (`ClientError`), saturation, and cancellation never
    /// do, per the adapter edge-case policies.
    pub fn counts_as_breaker_failure(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}
