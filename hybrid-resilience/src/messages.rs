//! User-facing messages for the failure taxonomy

use crate::types::FallbackAction;

pub const CIRCUIT_OPEN_MESSAGE: &str =
    "The service is temporarily unavailable (circuit breaker open). Please try again later.";

/// Message shown to the end user for an error code
pub fn message_for_code(code: &str) -> &'static str {
    match code {
        "TIMEOUT" => "The request took too long to complete. Please try again.",
        "NETWORK_ERROR" | "CONN_FAILED" => {
            "We could not reach the service. Please check your connection and try again."
        }
        "AUTH_FAILED" => "Your session could not be verified. Please sign in again.",
        "FORBIDDEN" => "You do not have permission to perform this action.",
        "NOT_FOUND" => "The requested item could not be found.",
        "RATE_LIMIT" => "Too many requests were made. Please wait a moment and try again.",
        "INVALID_REQUEST" => "The request was invalid. Please review your input.",
        "BOTH_FAILED" => "Both booking services are currently unavailable. Please try again later.",
        "AUDIT_FAILED" => "The action could not be recorded. Please contact support.",
        "CIRCUIT_OPEN" => CIRCUIT_OPEN_MESSAGE,
        _ => "An unexpected error occurred. Please try again later.",
    }
}

/// Hint appended when the caller is advised to fall back
pub fn fallback_hint(action: FallbackAction) -> Option<&'static str> {
    match action {
        FallbackAction::SwitchToApi | FallbackAction::SwitchToMcp => {
            Some("Switching to the backup service.")
        }
        FallbackAction::GracefulDegradation => Some("Some features may be temporarily limited."),
        FallbackAction::None => None,
    }
}

/// Compose the full user message for a code and fallback decision
pub fn user_message(code: &str, action: FallbackAction) -> String {
    let base = message_for_code(code);
    match fallback_hint(action) {
        Some(hint) => format!("{} {}", base, hint),
        None => base.to_string(),
    }
}
