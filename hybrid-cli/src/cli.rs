//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use hybrid_config::LogLevel;
use hybrid_resilience::ErrorSource;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the validated effective configuration
    Config {
        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },

    /// Classify a single error message
    Classify {
        /// Error message as reported by the backend
        message: String,

        /// Logical operation that failed
        #[arg(long, value_name = "NAME", default_value = "unknown")]
        operation: String,

        /// Backend that produced the error: mcp, api, hybrid, system
        #[arg(long, value_name = "SOURCE", default_value = "hybrid")]
        source: ErrorSource,
    },

    /// Replay a scripted sequence of failures and successes
    Simulate {
        /// Path to the YAML script
        script: PathBuf,
    },
}
