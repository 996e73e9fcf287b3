//! Retrying executor for backend calls
//!
//! Runs an async call against one backend, routes each failure through
//! [`ResilienceEngine::handle_error`], waits the advised delay and tries
//! again while the engine allows it. Success is reported back so breakers
//! close once the backend recovers. When retries are exhausted the final
//! [`RecoveryStrategy`] is returned so the caller can act on its fallback.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::engine::ResilienceEngine;
use crate::messages;
use crate::types::{circuit_key, ErrorSource, FallbackAction, RecoveryStrategy};

/// Failure of an executed call
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError<E> {
    /// The breaker refused the call before it was attempted
    #[error("Circuit breaker is open for {key}")]
    CircuitOpen { key: String, fallback_action: FallbackAction },

    /// The call failed and the engine advised not to retry further
    #[error("Operation failed after {attempts} attempt(s): {last_error}")]
    Failed {
        attempts: u32,
        last_error: E,
        strategy: RecoveryStrategy,
    },
}

impl<E> ExecutionError<E> {
    /// Fallback the caller should take
    pub fn fallback_action(&self) -> FallbackAction {
        match self {
            ExecutionError::CircuitOpen { fallback_action, .. } => *fallback_action,
            ExecutionError::Failed { strategy, .. } => strategy.fallback_action,
        }
    }

    /// Message suitable for the end user
    pub fn user_message(&self) -> String {
        match self {
            ExecutionError::CircuitOpen { fallback_action, .. } => {
                messages::user_message("CIRCUIT_OPEN", *fallback_action)
            }
            ExecutionError::Failed { strategy, .. } => strategy.user_message.clone(),
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            ExecutionError::CircuitOpen { .. } => None,
            ExecutionError::Failed { last_error, .. } => Some(last_error),
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ExecutionError::CircuitOpen { .. })
    }
}

/// Executes backend calls under the engine's retry and breaker policy
#[derive(Debug, Clone)]
pub struct HybridExecutor {
    engine: ResilienceEngine,
}

impl HybridExecutor {
    pub fn new(engine: ResilienceEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ResilienceEngine {
        &self.engine
    }

    /// Run `f` against `source` for `operation`
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation: &str,
        source: ErrorSource,
        f: F,
    ) -> Result<T, ExecutionError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_with_metadata(operation, source, HashMap::new(), f)
            .await
    }

    /// Like [`execute`](Self::execute), attaching `metadata` to every recorded failure
    pub async fn execute_with_metadata<F, Fut, T, E>(
        &self,
        operation: &str,
        source: ErrorSource,
        metadata: HashMap<String, JsonValue>,
        mut f: F,
    ) -> Result<T, ExecutionError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if !self.engine.is_request_allowed(operation, source) {
            // An open breaker counts as a high-severity outage of `source`.
            // Hybrid keys have no alternate backend, so they get no fallback.
            let fallback_action = crate::fallback::decide(
                source,
                crate::types::ErrorSeverity::High,
                self.engine.config().enable_graceful_degradation,
            );
            return Err(ExecutionError::CircuitOpen {
                key: circuit_key(source, operation),
                fallback_action,
            });
        }

        let mut attempt = 1;

        loop {
            debug!(operation, %source, attempt, "Executing backend call");

            match f(attempt).await {
                Ok(result) => {
                    self.engine.record_success(operation, source);
                    if attempt > 1 {
                        info!(operation, %source, "Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    let strategy =
                        self.engine
                            .handle_error(&error, operation, source, metadata.clone());

                    if !strategy.should_retry || attempt > strategy.max_retries {
                        warn!(
                            operation,
                            %source,
                            fallback = %strategy.fallback_action,
                            "Operation failed after {} attempts: {}",
                            attempt,
                            error
                        );
                        return Err(ExecutionError::Failed {
                            attempts: attempt,
                            last_error: error,
                            strategy,
                        });
                    }

                    warn!(
                        operation,
                        %source,
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt,
                        error,
                        strategy.retry_delay
                    );
                    sleep(strategy.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
