//! Fallback decision table

use crate::types::{ErrorSeverity, ErrorSource, FallbackAction};

/// Choose what the caller should fall back to after a failure
///
/// Pure table lookup; circuit state is handled by the engine before this is
/// consulted.
pub fn decide(
    source: ErrorSource,
    severity: ErrorSeverity,
    enable_graceful_degradation: bool,
) -> FallbackAction {
    if !enable_graceful_degradation {
        return FallbackAction::None;
    }

    match (source, severity) {
        (ErrorSource::Mcp, s) if s != ErrorSeverity::Low => FallbackAction::SwitchToApi,
        (ErrorSource::Api, s) if s != ErrorSeverity::Low => FallbackAction::SwitchToMcp,
        (ErrorSource::Hybrid, ErrorSeverity::Critical) => FallbackAction::GracefulDegradation,
        _ => FallbackAction::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_SEVERITIES: [ErrorSeverity; 4] = [
        ErrorSeverity::Low,
        ErrorSeverity::Medium,
        ErrorSeverity::High,
        ErrorSeverity::Critical,
    ];

    #[test]
    fn test_disabled_degradation_never_falls_back() {
        let sources = [
            ErrorSource::Mcp,
            ErrorSource::Api,
            ErrorSource::Hybrid,
            ErrorSource::System,
        ];
        for source in sources {
            for severity in ALL_SEVERITIES {
                assert_eq!(decide(source, severity, false), FallbackAction::None);
            }
        }
    }

    #[test]
    fn test_backend_failover() {
        use ErrorSeverity::*;

        assert_eq!(decide(ErrorSource::Mcp, Low, true), FallbackAction::None);
        assert_eq!(decide(ErrorSource::Mcp, Medium, true), FallbackAction::SwitchToApi);
        assert_eq!(decide(ErrorSource::Mcp, Critical, true), FallbackAction::SwitchToApi);
        assert_eq!(decide(ErrorSource::Api, Low, true), FallbackAction::None);
        assert_eq!(decide(ErrorSource::Api, High, true), FallbackAction::SwitchToMcp);
    }

    #[test]
    fn test_hybrid_and_system() {
        assert_eq!(
            decide(ErrorSource::Hybrid, ErrorSeverity::Critical, true),
            FallbackAction::GracefulDegradation
        );
        assert_eq!(decide(ErrorSource::Hybrid, ErrorSeverity::High, true), FallbackAction::None);
        for severity in ALL_SEVERITIES {
            assert_eq!(decide(ErrorSource::System, severity, true), FallbackAction::None);
        }
    }
}
