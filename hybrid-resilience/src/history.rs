//! Bounded error history and derived statistics

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::circuit_breaker::CircuitBreakerState;
use crate::types::{ErrorDetails, ErrorSeverity, ErrorSource};

/// Window used for per-source health levels
pub const HEALTH_WINDOW_MINUTES: i64 = 5;

/// Window used for the error rate
pub const ERROR_RATE_WINDOW_HOURS: i64 = 1;

/// Errors within the health window at which a source becomes critical
pub const CRITICAL_ERROR_COUNT: usize = 5;

/// Aggregate error statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total_errors: u64,
    pub mcp_errors: u64,
    pub api_errors: u64,
    pub hybrid_errors: u64,
    pub system_errors: u64,
    pub critical_errors: u64,
    pub last_error_time: Option<DateTime<Utc>>,
    /// Errors recorded within the last hour
    pub error_rate: u64,
}

/// Health level of a backend or of the whole system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
}

impl HealthLevel {
    /// Level for a number of recent errors
    pub fn from_recent_errors(count: usize) -> Self {
        match count {
            0 => HealthLevel::Healthy,
            n if n < CRITICAL_ERROR_COUNT => HealthLevel::Degraded,
            _ => HealthLevel::Critical,
        }
    }
}

impl std::fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthLevel::Healthy => write!(f, "healthy"),
            HealthLevel::Degraded => write!(f, "degraded"),
            HealthLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Operator-facing health report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub mcp: HealthLevel,
    pub api: HealthLevel,
    pub overall: HealthLevel,
    pub circuit_breakers: BTreeMap<String, CircuitBreakerState>,
}

/// Ring buffer of recent failures plus lifetime counters
#[derive(Debug)]
pub struct ErrorHistory {
    capacity: usize,
    entries: VecDeque<ErrorDetails>,
    counters: ErrorStats,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
            counters: ErrorStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Change capacity, evicting the oldest entries if it shrinks
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict_overflow();
    }

    pub fn record(&mut self, details: ErrorDetails) {
        self.counters.total_errors += 1;
        match details.source {
            ErrorSource::Mcp => self.counters.mcp_errors += 1,
            ErrorSource::Api => self.counters.api_errors += 1,
            ErrorSource::Hybrid => self.counters.hybrid_errors += 1,
            ErrorSource::System => self.counters.system_errors += 1,
        }
        if details.severity == ErrorSeverity::Critical {
            self.counters.critical_errors += 1;
        }
        self.counters.last_error_time = Some(
            self.counters
                .last_error_time
                .map_or(details.timestamp, |last| last.max(details.timestamp)),
        );

        self.entries.push_back(details);
        self.evict_overflow();
    }

    /// Drop all history and reset counters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.counters = ErrorStats::default();
    }

    pub fn stats(&self, now: DateTime<Utc>) -> ErrorStats {
        let since = now - Duration::hours(ERROR_RATE_WINDOW_HOURS);
        ErrorStats {
            error_rate: self.entries.iter().filter(|e| e.timestamp >= since).count() as u64,
            ..self.counters.clone()
        }
    }

    /// Most recent `limit` errors, newest first
    pub fn recent(&self, limit: usize) -> Vec<ErrorDetails> {
        // Ties on timestamp resolve newest-recorded first
        let mut recent: Vec<ErrorDetails> = self.entries.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        recent
    }

    /// Number of errors from `source` since `since`
    pub fn count_since(&self, source: ErrorSource, since: DateTime<Utc>) -> usize {
        self.entries
            .iter()
            .filter(|e| e.source == source && e.timestamp >= since)
            .count()
    }

    pub fn health(
        &self,
        now: DateTime<Utc>,
        circuit_breakers: BTreeMap<String, CircuitBreakerState>,
    ) -> HealthReport {
        let since = now - Duration::minutes(HEALTH_WINDOW_MINUTES);
        let mcp = HealthLevel::from_recent_errors(self.count_since(ErrorSource::Mcp, since));
        let api = HealthLevel::from_recent_errors(self.count_since(ErrorSource::Api, since));

        HealthReport {
            timestamp: now,
            mcp,
            api,
            overall: mcp.max(api),
            circuit_breakers,
        }
    }

    /// Oldest retained entry
    pub fn oldest(&self) -> Option<&ErrorDetails> {
        self.entries.front()
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}
