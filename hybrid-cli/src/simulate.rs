//! Scripted replay of failures and successes against a fresh engine

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hybrid_resilience::{
    ErrorSource, HealthReport, HybridErrorConfigUpdate, RecoveryStrategy, ResilienceEngine,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// A replay script
///
/// ```yaml
/// config:
///   circuit_breaker_threshold: 2
/// steps:
///   - kind: failure
///     operation: search
///     source: mcp
///     message: "TIMEOUT: upstream slow"
///   - kind: success
///     operation: search
///     source: mcp
///     after: 90s
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Script {
    /// Overrides applied on top of the loaded configuration
    pub config: HybridErrorConfigUpdate,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Failure {
        operation: String,
        source: ErrorSource,
        message: String,
        /// Simulated time elapsed since the previous step
        #[serde(default, with = "humantime_serde")]
        after: Option<Duration>,
    },
    Success {
        operation: String,
        source: ErrorSource,
        #[serde(default, with = "humantime_serde")]
        after: Option<Duration>,
    },
    Reset {
        /// Breaker key (`source:operation`); all breakers when absent
        #[serde(default)]
        key: Option<String>,
    },
}

/// Outcome of one replayed step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub at: DateTime<Utc>,
    pub key: Option<String>,
    pub allowed_before: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RecoveryStrategy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<StepOutcome>,
    pub health: HealthReport,
}

pub fn load_script(path: &Path) -> Result<Script> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read simulation script {:?}", path))?;
    serde_yaml::from_str(&content).context("Failed to parse simulation script")
}

/// Replay `script` on `engine`, starting the simulated clock at `start`
pub fn run(
    engine: &ResilienceEngine,
    script: &Script,
    start: DateTime<Utc>,
) -> Result<SimulationReport> {
    engine.update_config(script.config.clone());

    let mut now = start;
    let mut steps = Vec::with_capacity(script.steps.len());

    for (index, step) in script.steps.iter().enumerate() {
        let outcome = match step {
            Step::Failure {
                operation,
                source,
                message,
                after,
            } => {
                now = advance(now, *after)?;
                let allowed = engine.is_request_allowed_at(operation, *source, now);
                let strategy =
                    engine.handle_error_at(message, operation, *source, HashMap::new(), now);
                StepOutcome {
                    step: index + 1,
                    at: now,
                    key: Some(hybrid_resilience::types::circuit_key(*source, operation)),
                    allowed_before: Some(allowed),
                    strategy: Some(strategy),
                }
            }
            Step::Success {
                operation,
                source,
                after,
            } => {
                now = advance(now, *after)?;
                let allowed = engine.is_request_allowed_at(operation, *source, now);
                if allowed {
                    engine.record_success(operation, *source);
                }
                StepOutcome {
                    step: index + 1,
                    at: now,
                    key: Some(hybrid_resilience::types::circuit_key(*source, operation)),
                    allowed_before: Some(allowed),
                    strategy: None,
                }
            }
            Step::Reset { key } => {
                match key {
                    Some(key) => engine.reset_circuit_breaker(key),
                    None => engine.reset_all_circuit_breakers(),
                }
                StepOutcome {
                    step: index + 1,
                    at: now,
                    key: key.clone(),
                    allowed_before: None,
                    strategy: None,
                }
            }
        };
        steps.push(outcome);
    }

    Ok(SimulationReport {
        steps,
        health: engine.system_health_status_at(now),
    })
}

fn advance(now: DateTime<Utc>, after: Option<Duration>) -> Result<DateTime<Utc>> {
    match after {
        None => Ok(now),
        Some(elapsed) => {
            let delta = chrono::Duration::from_std(elapsed).context("Step delay out of range")?;
            now.checked_add_signed(delta)
                .context("Simulated clock overflowed")
        }
    }
}
