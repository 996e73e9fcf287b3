//! Best-effort alerting for critical failures
//!
//! Critical errors are pushed onto a bounded channel and delivered to an
//! [`AlertSink`] by a background task. Nothing on this path can fail the
//! caller: a full or closed channel drops the alert, a sink error is logged,
//! and both are counted so they stay observable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::types::ErrorDetails;

/// Default alert queue depth
pub const DEFAULT_ALERT_QUEUE: usize = 256;

/// Alert delivery errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The alert channel rejected the alert
    #[error("Alert delivery failed: {0}")]
    Delivery(String),

    /// The notifier task is gone
    #[error("Alert channel closed")]
    ChannelClosed,
}

/// Destination for critical-error alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, details: &ErrorDetails) -> Result<(), NotifyError>;
}

/// Sink that emits a structured log event per alert
#[derive(Debug, Default, Clone)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn send_alert(&self, details: &ErrorDetails) -> Result<(), NotifyError> {
        log_critical(details);
        Ok(())
    }
}

/// Emit the structured critical-error event
pub fn log_critical(details: &ErrorDetails) {
    error!(
        code = %details.code,
        source = %details.source,
        operation = %details.operation,
        severity = %details.severity,
        timestamp = %details.timestamp,
        "CRITICAL hybrid error: {}",
        details.message
    );
}

#[derive(Debug, Default)]
struct NotifierCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierMetrics {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Handle for queueing critical-error alerts
#[derive(Clone)]
pub struct CriticalErrorNotifier {
    sender: mpsc::Sender<ErrorDetails>,
    counters: Arc<NotifierCounters>,
}

impl std::fmt::Debug for CriticalErrorNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriticalErrorNotifier")
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl CriticalErrorNotifier {
    /// Start the delivery task on the current tokio runtime
    ///
    /// The task ends once every notifier handle has been dropped and the
    /// queue is drained.
    pub fn spawn(sink: Arc<dyn AlertSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<ErrorDetails>(capacity.max(1));
        let counters = Arc::new(NotifierCounters::default());
        let task_counters = counters.clone();

        let handle = tokio::spawn(async move {
            while let Some(details) = receiver.recv().await {
                match sink.send_alert(&details).await {
                    Ok(()) => {
                        task_counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        task_counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            code = %details.code,
                            operation = %details.operation,
                            "Failed to send critical error notification: {}",
                            e
                        );
                    }
                }
            }
        });

        (Self { sender, counters }, handle)
    }

    /// Queue an alert without waiting
    pub fn notify(&self, details: &ErrorDetails) {
        if let Err(e) = self.try_notify(details) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                code = %details.code,
                operation = %details.operation,
                "Dropping critical error notification: {}",
                e
            );
        }
    }

    fn try_notify(&self, details: &ErrorDetails) -> Result<(), NotifyError> {
        self.sender.try_send(details.clone()).map_err(|e| match e {
            TrySendError::Full(_) => NotifyError::Delivery("alert queue is full".to_string()),
            TrySendError::Closed(_) => NotifyError::ChannelClosed,
        })
    }

    pub fn metrics(&self) -> NotifierMetrics {
        NotifierMetrics {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::types::ErrorSource;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send_alert(&self, details: &ErrorDetails) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Delivery("pager offline".to_string()));
            }
            self.alerts.lock().push(details.code.clone());
            Ok(())
        }
    }

    fn critical() -> ErrorDetails {
        classify("Error Code: BOTH_FAILED", "bookCreation", ErrorSource::Hybrid, HashMap::new())
    }

    async fn settle(notifier: &CriticalErrorNotifier, expected: u64) -> NotifierMetrics {
        for _ in 0..200 {
            let metrics = notifier.metrics();
            if metrics.delivered + metrics.failed >= expected {
                return metrics;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        notifier.metrics()
    }

    #[tokio::test]
    async fn test_alerts_are_delivered() {
        let sink = Arc::new(RecordingSink::default());
        let (notifier, _handle) = CriticalErrorNotifier::spawn(sink.clone(), 8);

        notifier.notify(&critical());
        notifier.notify(&critical());

        let metrics = settle(&notifier, 2).await;
        assert_eq!(metrics.delivered, 2);
        assert_eq!(metrics.failed, 0);
        assert_eq!(*sink.alerts.lock(), vec!["BOTH_FAILED".to_string(); 2]);
    }

    #[tokio::test]
    async fn test_sink_failures_are_counted_not_propagated() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let (notifier, _handle) = CriticalErrorNotifier::spawn(sink, 8);

        notifier.notify(&critical());

        let metrics = settle(&notifier, 1).await;
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.delivered, 0);
    }

    #[tokio::test]
    async fn test_closed_channel_drops() {
        let (notifier, handle) = CriticalErrorNotifier::spawn(Arc::new(TracingAlertSink), 1);
        handle.abort();
        let _ = handle.await;

        notifier.notify(&critical());
        assert_eq!(notifier.metrics().dropped, 1);
    }

    #[tokio::test]
    async fn test_task_exits_when_handles_dropped() {
        let (notifier, handle) = CriticalErrorNotifier::spawn(Arc::new(TracingAlertSink), 4);
        notifier.notify(&critical());
        drop(notifier);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("notifier task should finish")
            .unwrap();
    }
}
