//! Configuration for the hybrid resilience engine
//!
//! The engine itself never reads the environment. This crate builds a plain
//! [`HybridErrorConfig`] from a YAML file and/or prefixed environment
//! variables, validates it, and hands it over.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use domains::logging::{LogFormat, LogLevel, LoggingConfig};
pub use domains::HybridConfig;
pub use error::{ConfigError, ConfigResult};
pub use hybrid_resilience::HybridErrorConfig;
pub use loader::ConfigLoader;
pub use validation::Validatable;
