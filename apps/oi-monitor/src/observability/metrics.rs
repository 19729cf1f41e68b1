//! Prometheus metrics for the collection pipeline.
//!
//! Recording functions are no-ops until a recorder is installed, so the
//! library can be used (and tested) without an exporter.
//!
//! # Example
//!
//! ```ignore
//! use oi_monitor::observability::metrics::{init_metrics, record_fetch_request};
//!
//! init_metrics("0.0.0.0:9090".parse()?)?;
//! record_fetch_request("klines", "success");
//! ```

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Histogram buckets for cycle durations (in seconds).
const CYCLE_DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Initialize the Prometheus metrics exporter.
///
/// This starts an HTTP server that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the metrics exporter fails to start (e.g., port already in use).
pub fn init_metrics(listen_addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .set_buckets(CYCLE_DURATION_BUCKETS)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %listen_addr, "Prometheus metrics exporter started");

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Fetcher Metrics
// ============================================================================

/// Record one upstream HTTP request.
///
/// # Arguments
///
/// * `endpoint` - Endpoint label (e.g., "klines", "open_interest_hist")
/// * `outcome` - "success", "retry", "rate_limited", "banned" or "error"
pub fn record_fetch_request(endpoint: &str, outcome: &str) {
    counter!(
        "oi_fetch_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a backoff sleep before a retry.
pub fn record_retry(trigger: &str, delay_seconds: f64) {
    counter!("oi_fetch_retries_total", "trigger" => trigger.to_string()).increment(1);
    histogram!("oi_fetch_backoff_seconds", "trigger" => trigger.to_string()).record(delay_seconds);
}

/// Record a chunk whose retries were exhausted.
pub fn record_chunk_unavailable(endpoint: &str) {
    counter!("oi_fetch_chunks_unavailable_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record response rows dropped during coercion.
pub fn record_rows_dropped(endpoint: &str, count: usize) {
    counter!("oi_fetch_rows_dropped_total", "endpoint" => endpoint.to_string())
        .increment(count as u64);
}

// ============================================================================
// Store Metrics
// ============================================================================

/// Record points written for one metric.
pub fn record_points_upserted(metric: &str, granularity: &str, count: usize) {
    counter!(
        "oi_points_upserted_total",
        "metric" => metric.to_string(),
        "granularity" => granularity.to_string()
    )
    .increment(count as u64);
}

/// Record a failed store operation.
pub fn record_store_error(operation: &str) {
    counter!("oi_store_errors_total", "operation" => operation.to_string()).increment(1);
}

// ============================================================================
// Detection Metrics
// ============================================================================

/// Record a detected anomaly.
pub fn record_anomaly(kind: &str, granularity: &str, severity: &str) {
    counter!(
        "oi_anomalies_detected_total",
        "kind" => kind.to_string(),
        "granularity" => granularity.to_string(),
        "severity" => severity.to_string()
    )
    .increment(1);
}

/// Record a notification attempt.
pub fn record_notification(outcome: &str) {
    counter!("oi_notifications_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a completed collection cycle.
pub fn record_cycle(duration_seconds: f64, anomalies: usize) {
    histogram!("oi_cycle_duration_seconds").record(duration_seconds);
    gauge!("oi_last_cycle_anomalies").set(anomalies as f64);
}
