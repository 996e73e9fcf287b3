//! Logging setup for the hybrid resilience engine
//!
//! The engine only emits `tracing` events; binaries call one of the
//! initializers here once at startup.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
