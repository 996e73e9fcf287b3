//! Resilience engine configuration

use hybrid_resilience::HybridErrorConfig;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

impl Validatable for HybridErrorConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();

        validate_positive(self.circuit_breaker_threshold, "circuit_breaker_threshold", domain)?;
        validate_positive(self.max_history_size, "max_history_size", domain)?;
        validate_positive(self.retry_delay.as_millis(), "retry_delay (ms)", domain)?;
        validate_positive(
            self.circuit_breaker_timeout.as_millis(),
            "circuit_breaker_timeout (ms)",
            domain,
        )?;

        if self.max_retry_delay < self.retry_delay {
            return Err(self.validation_error(format!(
                "max_retry_delay ({:?}) must not be smaller than retry_delay ({:?})",
                self.max_retry_delay, self.retry_delay
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "resilience"
    }
}
