//! Per-key circuit breaker registry
//!
//! One breaker per `source:operation` key, created lazily on first use. A
//! breaker opens once its failure streak reaches the threshold, rejects
//! requests until its timeout elapses, then lets exactly one probe through
//! (half-open). A recorded success closes it again; a failure while
//! half-open or after the cooldown is counted and reopens it for another
//! timeout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Failures further apart than this start a new streak
pub const FAILURE_STREAK_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests are blocked
    Open,
    /// Circuit is half-open, a single probe is allowed to test recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Internal tagged status of one breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Closed,
    Open { until: DateTime<Utc> },
    HalfOpen { probe_deadline: DateTime<Utc> },
}

#[derive(Debug, Clone)]
struct Breaker {
    status: Status,
    failure_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
}

impl Breaker {
    fn closed() -> Self {
        Self {
            status: Status::Closed,
            failure_count: 0,
            last_failure_time: None,
        }
    }

    fn snapshot(&self) -> CircuitBreakerState {
        let (state, next_retry_time) = match self.status {
            Status::Closed => (CircuitState::Closed, None),
            Status::Open { until } => (CircuitState::Open, Some(until)),
            Status::HalfOpen { probe_deadline } => (CircuitState::HalfOpen, Some(probe_deadline)),
        };

        CircuitBreakerState {
            state,
            is_open: state != CircuitState::Closed,
            failure_count: self.failure_count,
            last_failure_time: self.last_failure_time,
            next_retry_time,
        }
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    /// True while the breaker is not closed (open or probing)
    pub is_open: bool,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_retry_time: Option<DateTime<Utc>>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Breaker::closed().snapshot()
    }
}

/// Outcome of presenting a fresh failure to a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The failure was counted; `attempt` is the streak length
    Proceed { attempt: u32 },
    /// Breaker is open; do not retry
    Rejected,
}

/// Registry of circuit breakers keyed by `source:operation`
///
/// Only consecutive failures trip a breaker. A closed breaker whose previous
/// failure is older than [`FAILURE_STREAK_WINDOW`] starts a new streak at 1,
/// so failures spaced further apart than that never open it.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    threshold: u32,
    timeout: Duration,
    breakers: BTreeMap<String, Breaker>,
}

impl CircuitBreakerRegistry {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            timeout,
            breakers: BTreeMap::new(),
        }
    }

    /// Change threshold and timeout; existing breakers keep their state
    pub fn set_policy(&mut self, threshold: u32, timeout: Duration) {
        self.threshold = threshold.max(1);
        self.timeout = timeout;
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Current state of a breaker, creating a closed one if absent
    pub fn state(&mut self, key: &str) -> CircuitBreakerState {
        self.entry(key).snapshot()
    }

    /// Current failure streak for a key without creating an entry
    pub fn failure_count(&self, key: &str) -> u32 {
        self.breakers.get(key).map(|b| b.failure_count).unwrap_or(0)
    }

    /// Record a failure for `key` at `now`
    pub fn record_failure(&mut self, key: &str, now: DateTime<Utc>) -> CircuitBreakerState {
        let threshold = self.threshold;
        let until = self.deadline_from(now);
        let breaker = self.entry(key);

        if breaker.status == Status::Closed {
            let stale = breaker
                .last_failure_time
                .map(|last| now - last > chrono_window())
                .unwrap_or(false);
            if stale {
                breaker.failure_count = 0;
            }
        }

        breaker.failure_count = breaker.failure_count.saturating_add(1);
        breaker.last_failure_time = Some(now);

        let status = breaker.status;
        match status {
            Status::Closed if breaker.failure_count >= threshold => {
                breaker.status = Status::Open { until };
                warn!(
                    key,
                    failures = breaker.failure_count,
                    "Circuit breaker opened after {} consecutive failures",
                    breaker.failure_count
                );
            }
            Status::HalfOpen { .. } => {
                breaker.status = Status::Open { until };
                warn!(key, "Probe failed, circuit breaker reopened");
            }
            Status::Open { until: current } if now >= current => {
                breaker.status = Status::Open { until };
                warn!(key, "Failure after cooldown, circuit breaker reopened");
            }
            Status::Open { .. } => {
                // Failures reported while open do not extend the cooldown
            }
            Status::Closed => {
                debug!(key, failures = breaker.failure_count, threshold, "Failure recorded");
            }
        }

        breaker.snapshot()
    }

    /// Whether a request for `key` may be attempted at `now`
    ///
    /// Once an open breaker's cooldown has elapsed this grants a single probe
    /// and moves the breaker to half-open; further calls are refused until the
    /// probe reports back or its deadline passes.
    pub fn is_request_allowed(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        let probe_deadline = self.deadline_from(now);
        let breaker = self.entry(key);

        let status = breaker.status;
        match status {
            Status::Closed => true,
            Status::Open { until } if now >= until => {
                breaker.status = Status::HalfOpen { probe_deadline };
                info!(key, "Circuit breaker half-open, allowing probe");
                true
            }
            Status::Open { .. } => false,
            Status::HalfOpen { probe_deadline: deadline } if now >= deadline => {
                breaker.status = Status::HalfOpen { probe_deadline };
                debug!(key, "Probe deadline elapsed, allowing another probe");
                true
            }
            Status::HalfOpen { .. } => false,
        }
    }

    /// Present a freshly observed failure to the breaker for `key`
    ///
    /// Closed breakers count the failure. An open breaker still cooling down
    /// rejects it. Any other failure is the failed probe: it is counted and
    /// the breaker reopens for a fresh timeout. Only a failure arriving while
    /// a probe is outstanding is rejected as well.
    pub fn admit_failure(&mut self, key: &str, now: DateTime<Utc>) -> Admission {
        let status = self.entry(key).status;

        match status {
            Status::Open { until } if now < until => Admission::Rejected,
            Status::HalfOpen { probe_deadline } if now < probe_deadline => {
                self.record_failure(key, now);
                Admission::Rejected
            }
            Status::Closed | Status::Open { .. } | Status::HalfOpen { .. } => {
                let state = self.record_failure(key, now);
                Admission::Proceed {
                    attempt: state.failure_count,
                }
            }
        }
    }

    /// Record a successful call, closing the breaker
    pub fn record_success(&mut self, key: &str) {
        if let Some(breaker) = self.breakers.get_mut(key) {
            if breaker.status != Status::Closed {
                info!(key, "Circuit breaker closed after successful recovery");
            }
            breaker.status = Status::Closed;
            breaker.failure_count = 0;
        }
    }

    /// Reset a breaker to closed with zero failures
    pub fn reset(&mut self, key: &str) {
        self.breakers.insert(key.to_string(), Breaker::closed());
        info!(key, "Circuit breaker manually reset");
    }

    pub fn reset_all(&mut self) {
        for breaker in self.breakers.values_mut() {
            *breaker = Breaker::closed();
        }
        info!(count = self.breakers.len(), "All circuit breakers manually reset");
    }

    /// Snapshot of every known breaker
    pub fn snapshot(&self) -> BTreeMap<String, CircuitBreakerState> {
        self.breakers
            .iter()
            .map(|(key, breaker)| (key.clone(), breaker.snapshot()))
            .collect()
    }

    fn entry(&mut self, key: &str) -> &mut Breaker {
        self.breakers
            .entry(key.to_string())
            .or_insert_with(Breaker::closed)
    }

    fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn chrono_window() -> chrono::Duration {
    chrono::Duration::seconds(FAILURE_STREAK_WINDOW.as_secs() as i64)
}
