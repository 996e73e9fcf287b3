use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use hybrid_config::{ConfigLoader, HybridConfig};
use hybrid_resilience::{
    notifier::DEFAULT_ALERT_QUEUE, CriticalErrorNotifier, ResilienceEngine, TracingAlertSink,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod cli;
mod simulate;

use cli::{Cli, Commands};

fn load_config(config_file: Option<&PathBuf>) -> Result<HybridConfig> {
    ConfigLoader::new()
        .load(config_file)
        .context("Failed to load configuration")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
    println!("{}", output);
    Ok(())
}

/// Handle configuration display
fn handle_config(config: &HybridConfig, format: &str) -> Result<()> {
    match format.to_lowercase().as_str() {
        "yaml" | "yml" => {
            let yaml_output = config.to_yaml().context("Failed to serialize to YAML")?;
            println!("{}", yaml_output);
        }
        "json" => print_json(config)?,
        _ => {
            return Err(anyhow::anyhow!(
                "Unknown output format: {}. Valid formats: yaml, json",
                format
            ));
        }
    }
    Ok(())
}

async fn handle_simulate(config: &HybridConfig, script: &PathBuf) -> Result<()> {
    info!("Replaying simulation script: {:?}", script);
    let script = simulate::load_script(script)?;

    let (notifier, handle) =
        CriticalErrorNotifier::spawn(Arc::new(TracingAlertSink), DEFAULT_ALERT_QUEUE);
    let engine = ResilienceEngine::builder()
        .config(config.resilience.clone())
        .notifier(notifier)
        .build();

    let report = simulate::run(&engine, &script, Utc::now())?;
    print_json(&report)?;

    // Let queued alerts flush before exiting
    drop(engine);
    if let Err(e) = handle.await {
        error!("Alert task ended abnormally: {}", e);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration validation failed: {:#}", e);
            return Err(e);
        }
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    hybrid_logging::init_logging_from_config(&config.logging)?;

    match &cli.command {
        Commands::Config { format } => handle_config(&config, format),
        Commands::Classify {
            message,
            operation,
            source,
        } => {
            let details = hybrid_resilience::classify(message, operation, *source, HashMap::new());
            print_json(&details)
        }
        Commands::Simulate { script } => handle_simulate(&config, script).await,
    }
}
