//! Domain-specific configuration modules

pub mod logging;
pub mod resilience;

use hybrid_resilience::HybridErrorConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;

/// Top-level configuration combining all domains
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    /// Resilience engine configuration
    pub resilience: HybridErrorConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl HybridConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.resilience.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Render the configuration as YAML
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
