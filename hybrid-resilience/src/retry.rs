//! Retry delay calculation

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::HybridErrorConfig;

/// Jitter is drawn uniformly from `[0, JITTER_RATIO * delay)`
pub const JITTER_RATIO: f64 = 0.1;

/// Exponential backoff policy: `base * 2^(attempt-1)`, capped, plus jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts advertised to callers
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Cap applied before jitter
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Whether to add jitter to retry delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HybridErrorConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HybridErrorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_delay,
            max_delay: config.max_retry_delay.max(config.retry_delay),
            jitter: true,
        }
    }

    /// Delay for a 1-indexed attempt, without jitter
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay for a 1-indexed attempt, with jitter when enabled
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for_attempt(attempt);
        if self.jitter {
            add_jitter(delay)
        } else {
            delay
        }
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.0..JITTER_RATIO);
    delay + delay.mul_f64(factor)
}
