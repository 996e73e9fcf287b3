//! Configuration loading and environment variable handling

use crate::domains::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::domains::HybridConfig;
use crate::error::{ConfigError, ConfigResult};
use hybrid_resilience::HybridErrorConfig;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "HYBRID";

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<HybridConfig> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let mut config: HybridConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<HybridConfig> {
        let mut config = HybridConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration from `config_path` if given, otherwise from the environment
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<HybridConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut HybridConfig) -> ConfigResult<()> {
        self.apply_resilience_overrides(&mut config.resilience)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply resilience engine overrides
    ///
    /// Delays are given in whole milliseconds.
    fn apply_resilience_overrides(&self, config: &mut HybridErrorConfig) -> ConfigResult<()> {
        if let Some(retries) = self.parse_env::<u32>("RETRY_ATTEMPTS")? {
            config.max_retries = retries;
        }

        if let Some(delay) = self.parse_millis("RETRY_DELAY")? {
            config.retry_delay = delay;
        }

        if let Some(delay) = self.parse_millis("MAX_RETRY_DELAY")? {
            config.max_retry_delay = delay;
        }

        if let Some(threshold) = self.parse_env::<u32>("FAILOVER_THRESHOLD")? {
            config.circuit_breaker_threshold = threshold;
        }

        if let Some(timeout) = self.parse_millis("CIRCUIT_BREAKER_TIMEOUT")? {
            config.circuit_breaker_timeout = timeout;
        }

        if let Some(enabled) = self.parse_env::<bool>("ENABLE_GRACEFUL_DEGRADATION")? {
            config.enable_graceful_degradation = enabled;
        }

        if let Some(enabled) = self.parse_env::<bool>("ENABLE_ERROR_TRACKING")? {
            config.error_tracking_enabled = enabled;
        }

        if let Some(enabled) = self.parse_env::<bool>("NOTIFY_ON_CRITICAL_ERRORS")? {
            config.notify_on_critical_errors = enabled;
        }

        if let Some(size) = self.parse_env::<usize>("MAX_HISTORY_SIZE")? {
            config.max_history_size = size;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(&self, config: &mut LoggingConfig) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    fn parse_env<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e))),
            Err(_) => Ok(None),
        }
    }

    fn parse_millis(&self, name: &str) -> ConfigResult<Option<Duration>> {
        Ok(self.parse_env::<u64>(name)?.map(Duration::from_millis))
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
