//! Per-engine circuit breaker: a CLOSED / OPEN / HALF_OPEN state machine
//! that prevents dispatch to an engine showing repeated failure and
//! recovers via a single in-flight probe.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    30
}

/// Per-engine breaker tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

/// The breaker's externally observable phase.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Closed,
    Open,
    HalfOpen,
}

/// The outcome of an admission check.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Admit {
    Allowed,
    Denied,
}

/// The outcome to feed back into the breaker after an attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Outcome {
    Ok,
    Fail,
}

struct Inner {
    phase: Phase,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    config: BreakerConfig,
}

/// A single engine's breaker. All operations are O(1) and serialized by
/// an internal mutex, matching the "transitions are atomic" contract.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
                config,
            }),
        }
    }

    /// Consulted before dispatch. OPEN denies unless the recovery timeout
    /// has elapsed, in which case it admits exactly one probe and moves to
    /// HALF_OPEN. HALF_OPEN admits at most one concurrent probe; a second
    /// concurrent caller is denied.
    pub fn allow_request(&self) -> Admit {
        let mut inner = self.inner.lock().unwrap();
        match inner.phase {
            Phase::Closed => Admit::Allowed,
            Phase::HalfOpen => {
                if inner.probe_in_flight {
                    Admit::Denied
                } else {
                    inner.probe_in_flight = true;
                    Admit::Allowed
                }
            }
            Phase::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= inner.config.recovery_timeout() {
                    inner.phase = Phase::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!("breaker transitioning OPEN -> HALF_OPEN, admitting probe");
                    Admit::Allowed
                } else {
                    Admit::Denied
                }
            }
        }
    }

    /// Records the outcome of a dispatch admitted by [`allow_request`].
    pub fn record(&self, outcome: Outcome) {
        let mut inner = self.inner.lock().unwrap();
        match (inner.phase, outcome) {
            (Phase::HalfOpen, Outcome::Ok) => {
                inner.phase = Phase::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
                tracing::info!("breaker probe succeeded, transitioning HALF_OPEN -> CLOSED");
            }
            (Phase::HalfOpen, Outcome::Fail) => {
                inner.phase = Phase::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                tracing::warn!("breaker probe failed, transitioning HALF_OPEN -> OPEN");
            }
            (Phase::Closed, Outcome::Ok) => {
                inner.consecutive_failures = 0;
            }
            (Phase::Closed, Outcome::Fail) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= inner.config.failure_threshold {
                    inner.phase = Phase::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "breaker threshold reached, transitioning CLOSED -> OPEN"
                    );
                }
            }
            (Phase::Open, _) => {
                // A record arriving while OPEN (e.g. a late straggler from
                // before the last transition) has no effect.
            }
        }
        metrics::gauge!("breaker.phase").set(phase_value(inner.phase));
    }

    /// Releases the single HALF_OPEN probe slot without recording a
    /// success or failure outcome: for callers that were admitted by
    /// [`allow_request`] but bailed out before actually reaching the
    /// engine (pool saturation, cancellation, a non-breaker-failure
    /// error). Reverts HALF_OPEN back to OPEN with `opened_at` reset to
    /// now, so the recovery timeout restarts rather than leaving
    /// `probe_in_flight` set forever. A no-op outside HALF_OPEN.
    pub fn abandon_probe(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.phase == Phase::HalfOpen {
            inner.phase = Phase::Open;
            inner.opened_at = Some(Instant::now());
            inner.probe_in_flight = false;
            tracing::warn!("breaker probe abandoned before reaching the engine, reverting to OPEN");
        }
        metrics::gauge!("breaker.phase").set(phase_value(inner.phase));
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().unwrap().phase
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_failures
    }
}

fn phase_value(phase: Phase) -> f64 {
    match phase {
        Phase::Closed => 0.0,
        Phase::HalfOpen => 1.0,
        Phase::Open => 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout_secs: 0,
        }
    }

    #[test]
    fn closed_stays_closed_on_success() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..10 {
            assert_eq!(cb.allow_request(), Admit::Allowed);
            cb.record(Outcome::Ok);
        }
        assert_eq!(cb.phase(), Phase::Closed);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            assert_eq!(cb.allow_request(), Admit::Allowed);
            cb.record(Outcome::Fail);
        }
        assert_eq!(cb.phase(), Phase::Open);
    }

    #[test]
    fn open_denies_until_recovery_timeout_elapses() {
        let cb = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout_secs: 3600,
        });
        cb.allow_request();
        cb.record(Outcome::Fail);
        assert_eq!(cb.phase(), Phase::Open);
        assert_eq!(cb.allow_request(), Admit::Denied);
    }

    #[test]
    fn half_open_admits_single_probe() {
        let cb = CircuitBreaker::new(fast_config());
        cb.allow_request();
        cb.record(Outcome::Fail);
        cb.allow_request();
        cb.record(Outcome::Fail);
        cb.allow_request();
        cb.record(Outcome::Fail);
        assert_eq!(cb.phase(), Phase::Open);

        // recovery_timeout_secs == 0, so the next call transitions to half-open.
        assert_eq!(cb.allow_request(), Admit::Allowed);
        assert_eq!(cb.phase(), Phase::HalfOpen);
        // a second concurrent caller is denied while the probe is in flight.
        assert_eq!(cb.allow_request(), Admit::Denied);
    }

    #[test]
    fn half_open_probe_success_closes_breaker() {
        let cb = CircuitBreaker::new(fast_config());
        cb.allow_request();
        cb.record(Outcome::Fail);
        cb.allow_request();
        cb.record(Outcome::Fail);
        cb.allow_request();
        cb.record(Outcome::Fail);

        cb.allow_request();
        cb.record(Outcome::Ok);
        assert_eq!(cb.phase(), Phase::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn half_open_probe_failure_reopens_breaker() {
        let cb = CircuitBreaker::new(fast_config());
        cb.allow_request();
        cb.record(Outcome::Fail);
        cb.allow_request();
        cb.record(Outcome::Fail);
        cb.allow_request();
        cb.record(Outcome::Fail);

        cb.allow_request();
        cb.record(Outcome::Fail);
        assert_eq!(cb.phase(), Phase::Open);
    }

    #[test]
    fn abandoned_probe_reverts_to_open_and_frees_the_slot() {
        let cb = CircuitBreaker::new(fast_config());
        cb.allow_request();
        cb.record(Outcome::Fail);
        cb.allow_request();
        cb.record(Outcome::Fail);
        cb.allow_request();
        cb.record(Outcome::Fail);
        assert_eq!(cb.phase(), Phase::Open);

        assert_eq!(cb.allow_request(), Admit::Allowed);
        assert_eq!(cb.phase(), Phase::HalfOpen);

        // The probe was admitted but bailed out before reaching the
        // engine (saturated pool, cancellation, non-breaker-failure
        // error). Without abandon_probe, probe_in_flight would stay set
        // forever and allow_request would deny every future caller.
        cb.abandon_probe();
        assert_eq!(cb.phase(), Phase::Open);

        // A later caller is admitted into a fresh probe once recovery
        // timeout has elapsed again (it has, since fast_config uses 0).
        assert_eq!(cb.allow_request(), Admit::Allowed);
        assert_eq!(cb.phase(), Phase::HalfOpen);
    }

    #[test]
    fn abandon_probe_outside_half_open_is_a_no_op() {
        let cb = CircuitBreaker::new(fast_config());
        cb.abandon_probe();
        assert_eq!(cb.phase(), Phase::Closed);
    }
}
