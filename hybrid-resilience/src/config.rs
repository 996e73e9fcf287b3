//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration snapshot consumed by [`crate::ResilienceEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridErrorConfig {
    /// Maximum retry attempts advertised to callers
    pub max_retries: u32,

    /// Base delay for the first retry
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Upper bound for any computed retry delay (before jitter)
    #[serde(with = "humantime_serde")]
    pub max_retry_delay: Duration,

    /// Consecutive failures for one key before its circuit opens
    pub circuit_breaker_threshold: u32,

    /// How long an open circuit rejects requests before allowing a probe
    #[serde(with = "humantime_serde")]
    pub circuit_breaker_timeout: Duration,

    /// Whether failover/degradation advice is given at all
    pub enable_graceful_degradation: bool,

    /// Whether failures are kept in the rolling history
    pub error_tracking_enabled: bool,

    /// Whether critical failures are sent to the alert channel
    pub notify_on_critical_errors: bool,

    /// Capacity of the rolling error history
    pub max_history_size: usize,
}

impl Default for HybridErrorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
            enable_graceful_degradation: true,
            error_tracking_enabled: true,
            notify_on_critical_errors: true,
            max_history_size: 1000,
        }
    }
}

/// Partial configuration applied at runtime through
/// [`crate::ResilienceEngine::update_config`]. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridErrorConfigUpdate {
    pub max_retries: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub retry_delay: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub max_retry_delay: Option<Duration>,
    pub circuit_breaker_threshold: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub circuit_breaker_timeout: Option<Duration>,
    pub enable_graceful_degradation: Option<bool>,
    pub error_tracking_enabled: Option<bool>,
    pub notify_on_critical_errors: Option<bool>,
    pub max_history_size: Option<usize>,
}

impl HybridErrorConfig {
    /// Return a copy with every set field of `update` applied
    pub fn merged(&self, update: &HybridErrorConfigUpdate) -> Self {
        Self {
            max_retries: update.max_retries.unwrap_or(self.max_retries),
            retry_delay: update.retry_delay.unwrap_or(self.retry_delay),
            max_retry_delay: update.max_retry_delay.unwrap_or(self.max_retry_delay),
            circuit_breaker_threshold: update
                .circuit_breaker_threshold
                .unwrap_or(self.circuit_breaker_threshold),
            circuit_breaker_timeout: update
                .circuit_breaker_timeout
                .unwrap_or(self.circuit_breaker_timeout),
            enable_graceful_degradation: update
                .enable_graceful_degradation
                .unwrap_or(self.enable_graceful_degradation),
            error_tracking_enabled: update
                .error_tracking_enabled
                .unwrap_or(self.error_tracking_enabled),
            notify_on_critical_errors: update
                .notify_on_critical_errors
                .unwrap_or(self.notify_on_critical_errors),
            max_history_size: update.max_history_size.unwrap_or(self.max_history_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_keeps_unset_fields() {
        let base = HybridErrorConfig::default();
        let update = HybridErrorConfigUpdate {
            circuit_breaker_threshold: Some(2),
            notify_on_critical_errors: Some(false),
            ..Default::default()
        };

        let merged = base.merged(&update);
        assert_eq!(merged.circuit_breaker_threshold, 2);
        assert!(!merged.notify_on_critical_errors);
        assert_eq!(merged.max_retries, base.max_retries);
        assert_eq!(merged.retry_delay, base.retry_delay);
        assert_eq!(merged.max_history_size, 1000);
    }

    #[test]
    fn test_config_yaml_uses_human_durations() {
        let yaml = r#"
max_retries: 4
retry_delay: 250ms
circuit_breaker_timeout: 2m
"#;
        let config: HybridErrorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.circuit_breaker_timeout, Duration::from_secs(120));
        // Unspecified fields fall back to defaults
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert!(config.error_tracking_enabled);
    }
}
