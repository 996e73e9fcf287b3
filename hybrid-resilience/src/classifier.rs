//! Failure classification
//!
//! Turns a raw error (anything implementing `Display`) into an [`ErrorDetails`]
//! record. Classification is a pure function of the message, the operation
//! name, and the static tables below.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::types::{ErrorDetails, ErrorSeverity, ErrorSource};

pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// Operations whose failure is always critical
pub const CRITICAL_OPERATIONS: &[&str] = &["bookCreation", "bookCancellation", "auditLog"];

/// Codes that are critical regardless of operation
pub const CRITICAL_CODES: &[&str] = &["BOTH_FAILED", "AUDIT_FAILED", "AUTH_FAILED", "FORBIDDEN"];

/// Codes that must never be retried
pub const NON_RETRYABLE_CODES: &[&str] = &[
    "AUTH_FAILED",
    "FORBIDDEN",
    "NOT_FOUND",
    "INVALID_REQUEST",
    "RATE_LIMIT",
    "CIRCUIT_OPEN",
];

static ERROR_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Error Code:\s*([A-Za-z0-9_]+)").expect("valid regex"));
static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Code:\s*([A-Za-z0-9_]+)").expect("valid regex"));
static PREFIX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Z0-9_]*):\s").expect("valid regex"));
static HTTP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"HTTP\s+(\d{3})").expect("valid regex"));

/// Keyword fallbacks, checked against the lower-cased message in order
const KEYWORD_CODES: &[(&str, &str)] = &[
    ("timeout", "TIMEOUT"),
    ("network", "NETWORK_ERROR"),
    ("authentication", "AUTH_FAILED"),
    ("not found", "NOT_FOUND"),
    ("rate limit", "RATE_LIMIT"),
];

/// Classify a failure observed now
pub fn classify(
    error: impl std::fmt::Display,
    operation: &str,
    source: ErrorSource,
    metadata: HashMap<String, JsonValue>,
) -> ErrorDetails {
    classify_at(error, operation, source, metadata, Utc::now())
}

/// Classify a failure with an explicit observation time
pub fn classify_at(
    error: impl std::fmt::Display,
    operation: &str,
    source: ErrorSource,
    metadata: HashMap<String, JsonValue>,
    timestamp: DateTime<Utc>,
) -> ErrorDetails {
    let message = error.to_string();
    let code = extract_code(&message);
    let severity = severity_for(&code, operation);
    let retryable = is_retryable(&code);

    ErrorDetails {
        code,
        message,
        timestamp,
        source,
        operation: operation.to_string(),
        severity,
        retryable,
        metadata,
    }
}

/// Extract an error code from a message
pub fn extract_code(message: &str) -> String {
    for pattern in [&*ERROR_CODE_PATTERN, &*CODE_PATTERN, &*PREFIX_PATTERN] {
        if let Some(code) = pattern.captures(message).and_then(|c| c.get(1)) {
            return code.as_str().to_ascii_uppercase();
        }
    }

    if let Some(status) = HTTP_PATTERN
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
    {
        return http_status_code(status);
    }

    let lowered = message.to_lowercase();
    KEYWORD_CODES
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, code)| (*code).to_string())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

/// Map an HTTP status onto the failure taxonomy
pub fn http_status_code(status: u16) -> String {
    match status {
        400 | 422 => "INVALID_REQUEST".to_string(),
        401 => "AUTH_FAILED".to_string(),
        403 => "FORBIDDEN".to_string(),
        404 => "NOT_FOUND".to_string(),
        408 | 504 => "TIMEOUT".to_string(),
        429 => "RATE_LIMIT".to_string(),
        502 | 503 => "CONN_FAILED".to_string(),
        other => format!("HTTP_{}", other),
    }
}

pub fn severity_for(code: &str, operation: &str) -> ErrorSeverity {
    if CRITICAL_OPERATIONS.contains(&operation) || CRITICAL_CODES.contains(&code) {
        ErrorSeverity::Critical
    } else if code.contains("TIMEOUT") || code.contains("CONN_FAILED") {
        ErrorSeverity::High
    } else if code.contains("RATE_LIMIT") || code.contains("NOT_FOUND") {
        ErrorSeverity::Medium
    } else {
        ErrorSeverity::Low
    }
}

pub fn is_retryable(code: &str) -> bool {
    !NON_RETRYABLE_CODES.contains(&code)
}
