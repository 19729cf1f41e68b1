//! Anomaly Notifier Port
//!
//! Delivers persisted anomalies downstream. Delivery is at-most-once per
//! anomaly: a record is flagged notified only after its notifier call
//! succeeded, and the flag is never cleared.

use async_trait::async_trait;

use crate::domain::AnomalyRecord;
use crate::observability::metrics;
use crate::store::TimeSeriesStore;

/// Notification error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    /// Downstream channel unreachable.
    #[error("Notifier connection error: {message}")]
    ConnectionError {
        /// Error message.
        message: String,
    },

    /// Delivery rejected.
    #[error("Notification failed: {message}")]
    DeliveryFailed {
        /// Error message.
        message: String,
    },
}

/// Port for delivering anomalies.
#[async_trait]
pub trait AnomalyNotifier: Send + Sync {
    /// Deliver one anomaly.
    async fn notify(&self, anomaly: &AnomalyRecord) -> Result<(), NotifyError>;
}

/// Notifier that writes each anomaly to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl AnomalyNotifier for LogNotifier {
    async fn notify(&self, anomaly: &AnomalyRecord) -> Result<(), NotifyError> {
        tracing::warn!(
            symbol = %anomaly.symbol,
            kind = anomaly.kind.as_str(),
            granularity = anomaly.granularity.as_str(),
            severity = anomaly.severity.as_str(),
            timestamp = %anomaly.timestamp,
            value = anomaly.value,
            z_score = anomaly.z_score,
            "{}",
            anomaly.message
        );
        Ok(())
    }
}

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Delivered and flagged.
    pub delivered: usize,
    /// Notifier failed; left for the next pass.
    pub failed: usize,
    /// Delivered but the flag could not be written.
    pub unmarked: usize,
}

/// Deliver every unnotified anomaly, oldest first.
///
/// A failed delivery leaves the record unflagged for the next pass.
pub async fn dispatch_unnotified(
    store: &dyn TimeSeriesStore,
    notifier: &dyn AnomalyNotifier,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    for anomaly in store.unnotified_anomalies() {
        let Some(id) = anomaly.id else {
            continue;
        };

        if let Err(e) = notifier.notify(&anomaly).await {
            tracing::warn!(id, error = %e, "Notification failed, will retry next cycle");
            metrics::record_notification("failed");
            summary.failed += 1;
            continue;
        }

        match store.mark_notified(id) {
            Ok(()) => {
                metrics::record_notification("delivered");
                summary.delivered += 1;
            }
            Err(e) => {
                tracing::error!(id, error = %e, "Failed to flag anomaly as notified");
                metrics::record_notification("unmarked");
                summary.unmarked += 1;
            }
        }
    }

    if summary != DispatchSummary::default() {
        tracing::info!(
            delivered = summary.delivered,
            failed = summary.failed,
            unmarked = summary.unmarked,
            "Anomaly dispatch complete"
        );
    }
    summary
}
