//! Hybrid resilience engine
//!
//! Classifies failures from the MCP and REST backends and decides how the
//! caller should recover: retry with backoff, trip a per-operation circuit
//! breaker, fail over to the other backend, or degrade gracefully. Also
//! keeps a bounded error history for operator statistics and health.

pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod executor;
pub mod fallback;
pub mod history;
pub mod messages;
pub mod notifier;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use circuit_breaker::{CircuitBreakerRegistry, CircuitBreakerState, CircuitState};
pub use classifier::classify;
pub use config::{HybridErrorConfig, HybridErrorConfigUpdate};
pub use engine::{ResilienceEngine, ResilienceEngineBuilder};
pub use executor::{ExecutionError, HybridExecutor};
pub use history::{ErrorStats, HealthLevel, HealthReport};
pub use notifier::{
    AlertSink, CriticalErrorNotifier, NotifierMetrics, NotifyError, TracingAlertSink,
};
pub use retry::RetryPolicy;
pub use types::{ErrorDetails, ErrorSeverity, ErrorSource, FallbackAction, RecoveryStrategy};
