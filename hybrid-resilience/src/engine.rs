//! The resilience engine
//!
//! [`ResilienceEngine`] ties classification, history, circuit breaking,
//! retry and fallback decisions together behind a single `handle_error`
//! call. All mutable state sits behind one lock, so concurrent callers
//! reporting failures for the same key are serialized and no increment is
//! lost. Handles are cheap to clone and share the same state.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::circuit_breaker::{Admission, CircuitBreakerRegistry, CircuitBreakerState};
use crate::classifier::classify_at;
use crate::config::{HybridErrorConfig, HybridErrorConfigUpdate};
use crate::fallback;
use crate::history::{ErrorHistory, ErrorStats, HealthReport};
use crate::messages;
use crate::notifier::{log_critical, CriticalErrorNotifier, NotifierMetrics};
use crate::retry::RetryPolicy;
use crate::types::{circuit_key, ErrorDetails, ErrorSeverity, ErrorSource, RecoveryStrategy};

struct EngineState {
    config: HybridErrorConfig,
    retry: RetryPolicy,
    history: ErrorHistory,
    breakers: CircuitBreakerRegistry,
}

impl EngineState {
    fn new(config: HybridErrorConfig) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config),
            history: ErrorHistory::new(config.max_history_size),
            breakers: CircuitBreakerRegistry::new(
                config.circuit_breaker_threshold,
                config.circuit_breaker_timeout,
            ),
            config,
        }
    }
}

/// Shared failure-handling engine for the MCP and REST backends
#[derive(Clone)]
pub struct ResilienceEngine {
    state: Arc<Mutex<EngineState>>,
    notifier: Option<CriticalErrorNotifier>,
}

impl std::fmt::Debug for ResilienceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceEngine")
            .field("config", &self.config())
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl Default for ResilienceEngine {
    fn default() -> Self {
        Self::new(HybridErrorConfig::default())
    }
}

impl ResilienceEngine {
    /// Create an engine that logs critical errors instead of queueing alerts
    pub fn new(config: HybridErrorConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ResilienceEngineBuilder {
        ResilienceEngineBuilder::new()
    }

    /// Classify a failure and decide how the caller should recover
    pub fn handle_error(
        &self,
        error: impl std::fmt::Display,
        operation: &str,
        source: ErrorSource,
        metadata: HashMap<String, JsonValue>,
    ) -> RecoveryStrategy {
        self.handle_error_at(error, operation, source, metadata, Utc::now())
    }

    /// [`handle_error`](Self::handle_error) with an explicit observation time
    pub fn handle_error_at(
        &self,
        error: impl std::fmt::Display,
        operation: &str,
        source: ErrorSource,
        metadata: HashMap<String, JsonValue>,
        now: DateTime<Utc>,
    ) -> RecoveryStrategy {
        let details = classify_at(error, operation, source, metadata, now);
        let key = details.circuit_key();

        let (strategy, notify) = {
            let mut state = self.state.lock();

            if state.config.error_tracking_enabled {
                state.history.record(details.clone());
            }

            let fallback_action = fallback::decide(
                details.source,
                details.severity,
                state.config.enable_graceful_degradation,
            );

            let strategy = match state.breakers.admit_failure(&key, now) {
                Admission::Rejected => {
                    debug!(key = %key, code = %details.code, "Circuit open, not retrying");
                    RecoveryStrategy {
                        should_retry: false,
                        retry_delay: Duration::ZERO,
                        max_retries: 0,
                        fallback_action,
                        user_message: messages::user_message("CIRCUIT_OPEN", fallback_action),
                    }
                }
                Admission::Proceed { attempt } => {
                    let retry_delay = if details.retryable {
                        state.retry.delay_for_attempt(attempt)
                    } else {
                        Duration::ZERO
                    };
                    RecoveryStrategy {
                        should_retry: details.retryable,
                        retry_delay,
                        max_retries: state.config.max_retries,
                        fallback_action,
                        user_message: messages::user_message(&details.code, fallback_action),
                    }
                }
            };

            let notify = details.severity == ErrorSeverity::Critical
                && state.config.notify_on_critical_errors;
            (strategy, notify)
        };

        debug!(
            key = %key,
            code = %details.code,
            severity = %details.severity,
            should_retry = strategy.should_retry,
            fallback = %strategy.fallback_action,
            "Handled hybrid error"
        );

        if notify {
            self.dispatch_critical(&details);
        }

        strategy
    }

    /// Report a successful call so an open or probing breaker closes
    pub fn record_success(&self, operation: &str, source: ErrorSource) {
        self.state
            .lock()
            .breakers
            .record_success(&circuit_key(source, operation));
    }

    /// Whether the caller may attempt `operation` on `source` right now
    pub fn is_request_allowed(&self, operation: &str, source: ErrorSource) -> bool {
        self.is_request_allowed_at(operation, source, Utc::now())
    }

    pub fn is_request_allowed_at(
        &self,
        operation: &str,
        source: ErrorSource,
        now: DateTime<Utc>,
    ) -> bool {
        self.state
            .lock()
            .breakers
            .is_request_allowed(&circuit_key(source, operation), now)
    }

    /// Current state of the breaker for `key` (`source:operation`)
    pub fn circuit_state(&self, key: &str) -> CircuitBreakerState {
        self.state.lock().breakers.state(key)
    }

    /// Administrative override: close the breaker for `key`
    pub fn reset_circuit_breaker(&self, key: &str) {
        self.state.lock().breakers.reset(key);
    }

    pub fn reset_all_circuit_breakers(&self) {
        self.state.lock().breakers.reset_all();
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.error_stats_at(Utc::now())
    }

    pub fn error_stats_at(&self, now: DateTime<Utc>) -> ErrorStats {
        self.state.lock().history.stats(now)
    }

    /// Most recent `limit` errors, newest first
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorDetails> {
        self.state.lock().history.recent(limit)
    }

    pub fn system_health_status(&self) -> HealthReport {
        self.system_health_status_at(Utc::now())
    }

    pub fn system_health_status_at(&self, now: DateTime<Utc>) -> HealthReport {
        let state = self.state.lock();
        state.history.health(now, state.breakers.snapshot())
    }

    /// Apply a runtime configuration change
    pub fn update_config(&self, update: HybridErrorConfigUpdate) {
        let mut state = self.state.lock();
        let config = state.config.merged(&update);

        state.retry = RetryPolicy::from_config(&config);
        state
            .breakers
            .set_policy(config.circuit_breaker_threshold, config.circuit_breaker_timeout);
        state.history.set_capacity(config.max_history_size);
        state.config = config;

        info!(config = ?state.config, "Hybrid error configuration updated");
    }

    pub fn config(&self) -> HybridErrorConfig {
        self.state.lock().config.clone()
    }

    /// Drop the error history and reset the running counters
    pub fn clear_history(&self) {
        self.state.lock().history.clear();
        info!("Hybrid error history cleared");
    }

    pub fn notifier_metrics(&self) -> Option<NotifierMetrics> {
        self.notifier.as_ref().map(|n| n.metrics())
    }

    fn dispatch_critical(&self, details: &ErrorDetails) {
        match &self.notifier {
            Some(notifier) => notifier.notify(details),
            None => log_critical(details),
        }
    }
}

/// Builder for [`ResilienceEngine`]
#[derive(Default)]
pub struct ResilienceEngineBuilder {
    config: HybridErrorConfig,
    notifier: Option<CriticalErrorNotifier>,
}

impl ResilienceEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: HybridErrorConfig) -> Self {
        self.config = config;
        self
    }

    /// Queue critical errors to this notifier instead of logging them inline
    pub fn notifier(mut self, notifier: CriticalErrorNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> ResilienceEngine {
        if self.config.circuit_breaker_threshold == 0 {
            warn!("circuit_breaker_threshold of 0 treated as 1");
        }

        ResilienceEngine {
            state: Arc::new(Mutex::new(EngineState::new(self.config))),
            notifier: self.notifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::history::HealthLevel;
    use crate::notifier::{AlertSink, NotifyError};
    use crate::types::FallbackAction;
    use async_trait::async_trait;

    fn engine(threshold: u32) -> ResilienceEngine {
        ResilienceEngine::new(HybridErrorConfig {
            circuit_breaker_threshold: threshold,
            retry_delay: Duration::from_millis(100),
            ..Default::default()
        })
    }

    fn no_metadata() -> HashMap<String, JsonValue> {
        HashMap::new()
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let engine = engine(3);
        let now = Utc::now();

        for _ in 0..3 {
            let strategy = engine.handle_error_at(
                "TIMEOUT: MCP did not answer",
                "bookCreation",
                ErrorSource::Mcp,
                no_metadata(),
                now,
            );
            assert!(strategy.should_retry);
            assert_eq!(strategy.fallback_action, FallbackAction::SwitchToApi);
        }

        let strategy = engine.handle_error_at(
            "TIMEOUT: MCP did not answer",
            "bookCreation",
            ErrorSource::Mcp,
            no_metadata(),
            now + chrono::Duration::seconds(1),
        );
        assert!(!strategy.should_retry);
        assert_eq!(strategy.retry_delay, Duration::ZERO);
        assert_eq!(strategy.max_retries, 0);
        assert_eq!(strategy.fallback_action, FallbackAction::SwitchToApi);
        assert!(strategy.user_message.contains("circuit breaker open"));

        let state = engine.circuit_state("mcp:bookCreation");
        assert!(state.is_open);
        assert_eq!(state.failure_count, 3);
        assert!(state.next_retry_time.is_some());
    }

    #[test]
    fn test_not_found_on_api_search() {
        let engine = engine(5);
        let strategy = engine.handle_error(
            "Proposal not found",
            "search",
            ErrorSource::Api,
            no_metadata(),
        );

        assert!(!strategy.should_retry);
        assert_eq!(strategy.fallback_action, FallbackAction::SwitchToMcp);
        assert_eq!(
            strategy.user_message,
            "The requested item could not be found. Switching to the backup service."
        );

        let recent = engine.recent_errors(1);
        assert_eq!(recent[0].code, "NOT_FOUND");
        assert_eq!(recent[0].severity, ErrorSeverity::Medium);
        assert!(!recent[0].retryable);
    }

    #[test]
    fn test_backoff_grows_with_failure_streak() {
        let engine = ResilienceEngine::new(HybridErrorConfig {
            circuit_breaker_threshold: 10,
            retry_delay: Duration::from_millis(100),
            ..Default::default()
        });
        let now = Utc::now();

        let delays: Vec<Duration> = (0..4)
            .map(|_| {
                engine
                    .handle_error_at("network down", "vote", ErrorSource::Api, no_metadata(), now)
                    .retry_delay
            })
            .collect();

        for (attempt, delay) in delays.iter().enumerate() {
            let base = Duration::from_millis(100) * (1u32 << attempt);
            assert!(*delay >= base, "attempt {} delay {:?}", attempt + 1, delay);
            assert!(*delay < base + base / 10);
        }

        // Success ends the streak, so backoff starts over
        engine.record_success("vote", ErrorSource::Api);
        let delay = engine
            .handle_error_at("network down", "vote", ErrorSource::Api, no_metadata(), now)
            .retry_delay;
        assert!(delay < Duration::from_millis(110));
    }

    #[test]
    fn test_reset_circuit_breaker() {
        let engine = engine(1);
        let now = Utc::now();
        engine.handle_error_at("TIMEOUT: x", "search", ErrorSource::Mcp, no_metadata(), now);
        assert!(engine.circuit_state("mcp:search").is_open);
        assert!(!engine.is_request_allowed_at("search", ErrorSource::Mcp, now));

        engine.reset_circuit_breaker("mcp:search");
        let state = engine.circuit_state("mcp:search");
        assert!(!state.is_open);
        assert_eq!(state.failure_count, 0);
        assert!(engine.is_request_allowed_at("search", ErrorSource::Mcp, now));
    }

    #[test]
    fn test_reset_all_circuit_breakers() {
        let engine = engine(1);
        let now = Utc::now();
        engine.handle_error_at("TIMEOUT: x", "search", ErrorSource::Mcp, no_metadata(), now);
        engine.handle_error_at("TIMEOUT: x", "vote", ErrorSource::Api, no_metadata(), now);

        engine.reset_all_circuit_breakers();
        let health = engine.system_health_status_at(now);
        assert_eq!(health.circuit_breakers.len(), 2);
        assert!(health.circuit_breakers.values().all(|b| !b.is_open));
        // History survives a breaker reset
        assert_eq!(engine.error_stats_at(now).total_errors, 2);
    }

    #[test]
    fn test_failure_after_cooldown_is_counted() {
        let engine = engine(2);
        let now = Utc::now();
        for _ in 0..2 {
            engine.handle_error_at("TIMEOUT: x", "vote", ErrorSource::Mcp, no_metadata(), now);
        }

        // Cooldown elapsed: the failure counts and the breaker reopens
        let later = now + chrono::Duration::seconds(61);
        let strategy =
            engine.handle_error_at("TIMEOUT: x", "vote", ErrorSource::Mcp, no_metadata(), later);
        assert!(strategy.should_retry);
        assert_eq!(strategy.max_retries, 3);

        let state = engine.circuit_state("mcp:vote");
        assert_eq!(state.state, CircuitState::Open);
        assert_eq!(state.failure_count, 3);
        assert_eq!(state.last_failure_time, Some(later));
        assert_eq!(state.next_retry_time, Some(later + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_non_retryable_failure_after_cooldown_does_not_lock_key() {
        let engine = engine(2);
        let now = Utc::now();
        for _ in 0..2 {
            engine.handle_error_at("TIMEOUT: x", "search", ErrorSource::Api, no_metadata(), now);
        }

        let later = now + chrono::Duration::seconds(61);
        let strategy = engine.handle_error_at(
            "Proposal not found",
            "search",
            ErrorSource::Api,
            no_metadata(),
            later,
        );
        assert!(!strategy.should_retry);
        assert_eq!(engine.circuit_state("api:search").last_failure_time, Some(later));

        // The next cooldown ends on schedule and grants a probe
        let next = later + chrono::Duration::seconds(60);
        assert!(!engine.is_request_allowed_at("search", ErrorSource::Api, later));
        assert!(engine.is_request_allowed_at("search", ErrorSource::Api, next));
        assert_eq!(engine.circuit_state("api:search").state, CircuitState::HalfOpen);
    }

    #[test]
    fn test_probe_then_recovery() {
        let engine = engine(2);
        let now = Utc::now();
        for _ in 0..2 {
            engine.handle_error_at("TIMEOUT: x", "vote", ErrorSource::Mcp, no_metadata(), now);
        }

        let later = now + chrono::Duration::seconds(61);
        assert!(engine.is_request_allowed_at("vote", ErrorSource::Mcp, later));
        assert_eq!(engine.circuit_state("mcp:vote").state, CircuitState::HalfOpen);

        engine.record_success("vote", ErrorSource::Mcp);
        let state = engine.circuit_state("mcp:vote");
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 0);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let engine = engine(2);
        let now = Utc::now();
        for _ in 0..2 {
            engine.handle_error_at("TIMEOUT: x", "vote", ErrorSource::Mcp, no_metadata(), now);
        }

        let later = now + chrono::Duration::seconds(61);
        engine.handle_error_at("TIMEOUT: x", "vote", ErrorSource::Mcp, no_metadata(), later);
        let strategy =
            engine.handle_error_at("TIMEOUT: x", "vote", ErrorSource::Mcp, no_metadata(), later);
        assert!(!strategy.should_retry);

        let state = engine.circuit_state("mcp:vote");
        assert_eq!(state.state, CircuitState::Open);
        assert_eq!(state.next_retry_time, Some(later + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_tracking_disabled_skips_history() {
        let engine = ResilienceEngine::new(HybridErrorConfig {
            error_tracking_enabled: false,
            circuit_breaker_threshold: 2,
            ..Default::default()
        });
        let now = Utc::now();
        for _ in 0..2 {
            engine.handle_error_at("TIMEOUT: x", "vote", ErrorSource::Api, no_metadata(), now);
        }

        assert_eq!(engine.error_stats_at(now).total_errors, 0);
        assert!(engine.recent_errors(10).is_empty());
        // Breakers still work without history
        assert!(engine.circuit_state("api:vote").is_open);
    }

    #[test]
    fn test_degradation_disabled() {
        let engine = ResilienceEngine::new(HybridErrorConfig {
            enable_graceful_degradation: false,
            ..Default::default()
        });
        let strategy =
            engine.handle_error("TIMEOUT: x", "vote", ErrorSource::Mcp, no_metadata());
        assert_eq!(strategy.fallback_action, FallbackAction::None);
        assert_eq!(
            strategy.user_message,
            "The request took too long to complete. Please try again."
        );
    }

    #[test]
    fn test_health_and_stats() {
        let engine = engine(100);
        let now = Utc::now();
        for _ in 0..5 {
            engine.handle_error_at("TIMEOUT: x", "search", ErrorSource::Mcp, no_metadata(), now);
        }
        engine.handle_error_at("TIMEOUT: x", "search", ErrorSource::Api, no_metadata(), now);

        let health = engine.system_health_status_at(now);
        assert_eq!(health.mcp, HealthLevel::Critical);
        assert_eq!(health.api, HealthLevel::Degraded);
        assert_eq!(health.overall, HealthLevel::Critical);
        assert_eq!(health.circuit_breakers["mcp:search"].failure_count, 5);
        assert!(!health.circuit_breakers["api:search"].is_open);

        let stats = engine.error_stats_at(now);
        assert_eq!(stats.total_errors, 6);
        assert_eq!(stats.mcp_errors, 5);
        assert_eq!(stats.api_errors, 1);
        assert_eq!(stats.error_rate, 6);

        engine.clear_history();
        assert_eq!(engine.error_stats_at(now).total_errors, 0);
        assert_eq!(engine.system_health_status_at(now).overall, HealthLevel::Healthy);
    }

    #[test]
    fn test_update_config() {
        let engine = engine(5);
        let now = Utc::now();
        engine.handle_error_at("TIMEOUT: x", "search", ErrorSource::Mcp, no_metadata(), now);

        engine.update_config(HybridErrorConfigUpdate {
            circuit_breaker_threshold: Some(2),
            max_retries: Some(9),
            max_history_size: Some(1),
            ..Default::default()
        });

        let strategy =
            engine.handle_error_at("TIMEOUT: x", "search", ErrorSource::Mcp, no_metadata(), now);
        assert_eq!(strategy.max_retries, 9);
        assert!(engine.circuit_state("mcp:search").is_open);
        assert_eq!(engine.recent_errors(10).len(), 1);
        assert_eq!(engine.config().circuit_breaker_threshold, 2);
    }

    #[test]
    fn test_clones_share_state() {
        let engine = engine(1);
        let other = engine.clone();
        engine.handle_error("TIMEOUT: x", "search", ErrorSource::Api, no_metadata());
        assert!(other.circuit_state("api:search").is_open);
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let engine = engine(1_000_000);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        engine.handle_error("TIMEOUT: x", "vote", ErrorSource::Mcp, HashMap::new());
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(engine.circuit_state("mcp:vote").failure_count, 800);
        assert_eq!(engine.error_stats().total_errors, 800);
    }

    struct CountingSink(Mutex<u32>);

    #[async_trait]
    impl AlertSink for CountingSink {
        async fn send_alert(&self, _details: &ErrorDetails) -> Result<(), NotifyError> {
            *self.0.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_critical_errors_are_queued() {
        let sink = Arc::new(CountingSink(Mutex::new(0)));
        let (notifier, _task) = CriticalErrorNotifier::spawn(sink.clone(), 16);
        let engine = ResilienceEngine::builder().notifier(notifier).build();

        engine.handle_error(
            "Error Code: AUDIT_FAILED",
            "auditLog",
            ErrorSource::System,
            no_metadata(),
        );
        // Not critical
        engine.handle_error("TIMEOUT: x", "search", ErrorSource::Api, no_metadata());

        for _ in 0..200 {
            if *sink.0.lock() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*sink.0.lock(), 1);
        assert_eq!(engine.notifier_metrics().map(|m| m.delivered), Some(1));
    }

    #[tokio::test]
    async fn test_critical_notification_can_be_disabled() {
        let sink = Arc::new(CountingSink(Mutex::new(0)));
        let (notifier, _task) = CriticalErrorNotifier::spawn(sink.clone(), 16);
        let engine = ResilienceEngine::builder()
            .config(HybridErrorConfig {
                notify_on_critical_errors: false,
                ..Default::default()
            })
            .notifier(notifier)
            .build();

        engine.handle_error(
            "Error Code: BOTH_FAILED",
            "bookCreation",
            ErrorSource::Hybrid,
            no_metadata(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*sink.0.lock(), 0);
        assert_eq!(engine.notifier_metrics(), Some(NotifierMetrics::default()));
    }
}
