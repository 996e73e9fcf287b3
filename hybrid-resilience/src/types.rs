//! Core records shared by every component of the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Backend integration a failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    /// Legacy RPC-style backend
    Mcp,
    /// REST backend
    Api,
    /// The combined MCP/REST path (both backends involved)
    Hybrid,
    /// Local infrastructure, not tied to either backend
    System,
}

impl ErrorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSource::Mcp => "mcp",
            ErrorSource::Api => "api",
            ErrorSource::Hybrid => "hybrid",
            ErrorSource::System => "system",
        }
    }
}

impl std::fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mcp" => Ok(ErrorSource::Mcp),
            "api" => Ok(ErrorSource::Api),
            "hybrid" => Ok(ErrorSource::Hybrid),
            "system" => Ok(ErrorSource::System),
            other => Err(format!("unknown error source '{}'", other)),
        }
    }
}

/// Error severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "low"),
            ErrorSeverity::Medium => write!(f, "medium"),
            ErrorSeverity::High => write!(f, "high"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A single observed failure, classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub source: ErrorSource,
    pub operation: String,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, JsonValue>,
}

impl ErrorDetails {
    /// Circuit breaker key for this failure (`source:operation`)
    pub fn circuit_key(&self) -> String {
        circuit_key(self.source, &self.operation)
    }
}

/// Build the circuit breaker key for a source/operation pair
pub fn circuit_key(source: ErrorSource, operation: &str) -> String {
    format!("{}:{}", source, operation)
}

/// What the caller should do instead of (or after) retrying the failing backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    SwitchToApi,
    SwitchToMcp,
    GracefulDegradation,
    None,
}

impl std::fmt::Display for FallbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackAction::SwitchToApi => write!(f, "switch_to_api"),
            FallbackAction::SwitchToMcp => write!(f, "switch_to_mcp"),
            FallbackAction::GracefulDegradation => write!(f, "graceful_degradation"),
            FallbackAction::None => write!(f, "none"),
        }
    }
}

/// Recovery advice returned to the caller for one failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    pub should_retry: bool,
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    pub max_retries: u32,
    pub fallback_action: FallbackAction,
    pub user_message: String,
}
