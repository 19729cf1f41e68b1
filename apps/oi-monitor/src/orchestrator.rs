//! Collection orchestrator.
//!
//! Drives one monitoring cycle: collect history for both horizons, record
//! live snapshots, then run detection for both horizons. Steps run strictly
//! in order. A symbol that fails is logged and skipped; the cycle goes on.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::TrackingConfig;
use crate::detector::AnomalyDetector;
use crate::domain::{Granularity, MetricKind, Symbol, TimePoint, TrackingBucket};
use crate::fetcher::{FetchError, MarketDataFetcher, open_interest_points};
use crate::observability::metrics;
use crate::store::TimeSeriesStore;

/// Outcome of collecting one horizon for every symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    /// Symbols whose series were all fetched.
    pub symbols_ok: usize,
    /// Symbols with at least one unavailable series.
    pub symbols_failed: usize,
    /// Rows written.
    pub points_upserted: usize,
}

/// Outcome of one snapshot pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    /// Buckets written.
    pub buckets_upserted: usize,
    /// Symbols whose snapshot could not be fetched or stored.
    pub symbols_failed: usize,
}

/// Outcome of detection over every symbol for one horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    /// Anomalies found (new or re-detected).
    pub anomalies: usize,
    /// Rules skipped for lack of data.
    pub skipped_rules: usize,
    /// Anomalies that could not be persisted.
    pub persist_failures: usize,
}

/// Counts from one full cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// Cycle start.
    pub started_at: DateTime<Utc>,
    /// Wall time spent, in seconds.
    pub duration_secs: f64,
    /// Hourly history collection.
    pub hourly: CollectionSummary,
    /// Daily history collection.
    pub daily: CollectionSummary,
    /// Snapshot collection, when enabled.
    pub snapshots: Option<SnapshotSummary>,
    /// Hourly detection.
    pub hourly_detection: DetectionSummary,
    /// Daily detection.
    pub daily_detection: DetectionSummary,
}

impl CycleReport {
    /// Anomalies found across both horizons.
    #[must_use]
    pub const fn anomalies(&self) -> usize {
        self.hourly_detection.anomalies + self.daily_detection.anomalies
    }
}

/// Runs collection and detection for a fixed symbol set.
pub struct CollectionOrchestrator {
    fetcher: MarketDataFetcher,
    store: Arc<dyn TimeSeriesStore>,
    detector: AnomalyDetector,
    symbols: Vec<Symbol>,
    tracking: TrackingConfig,
}

impl std::fmt::Debug for CollectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionOrchestrator")
            .field("symbols", &self.symbols)
            .field("tracking", &self.tracking)
            .finish_non_exhaustive()
    }
}

impl CollectionOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        fetcher: MarketDataFetcher,
        store: Arc<dyn TimeSeriesStore>,
        detector: AnomalyDetector,
        symbols: Vec<Symbol>,
        tracking: TrackingConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            detector,
            symbols,
            tracking,
        }
    }

    /// Tracked symbols.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// The store cycles write to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TimeSeriesStore> {
        &self.store
    }

    /// Fetch and upsert the configured history of every series at `granularity`.
    pub async fn collect_history(&self, granularity: Granularity) -> CollectionSummary {
        let end = self.fetcher.server_now().await;
        let start = end - self.tracking.history(granularity);
        let mut summary = CollectionSummary::default();

        for symbol in &self.symbols {
            let (written, failures) = self
                .collect_symbol(symbol, granularity, start, end)
                .await;
            summary.points_upserted += written;
            if failures == 0 {
                summary.symbols_ok += 1;
            } else {
                summary.symbols_failed += 1;
            }
        }

        tracing::info!(
            granularity = granularity.as_str(),
            symbols_ok = summary.symbols_ok,
            symbols_failed = summary.symbols_failed,
            points = summary.points_upserted,
            "History collected"
        );
        summary
    }

    /// Returns rows written and the number of series that failed.
    async fn collect_symbol(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> (usize, usize) {
        let mut written = 0;
        let mut failures = 0;

        match self.fetcher.fetch_candles(symbol, granularity, start, end).await {
            Ok(candles) => {
                let (price, volume): (Vec<TimePoint>, Vec<TimePoint>) = candles
                    .iter()
                    .map(|c| {
                        let [price, volume] = c.to_points(symbol, granularity);
                        (price, volume)
                    })
                    .unzip();
                written += self.upsert(MetricKind::Price, granularity, &price);
                written += self.upsert(MetricKind::Volume, granularity, &volume);
            }
            Err(e) => {
                Self::log_fetch_failure(symbol, granularity, "candles", &e);
                failures += 1;
            }
        }

        match self
            .fetcher
            .fetch_open_interest_history(symbol, granularity, start, end)
            .await
        {
            Ok(rows) => {
                let points = open_interest_points(symbol, granularity, &rows);
                written += self.upsert(MetricKind::OpenInterest, granularity, &points);
            }
            Err(e) => {
                Self::log_fetch_failure(symbol, granularity, "open_interest", &e);
                failures += 1;
            }
        }

        (written, failures)
    }

    fn upsert(&self, metric: MetricKind, granularity: Granularity, points: &[TimePoint]) -> usize {
        let written = self.store.upsert_points(points);
        metrics::record_points_upserted(metric.as_str(), granularity.as_str(), written);
        written
    }

    fn log_fetch_failure(
        symbol: &Symbol,
        granularity: Granularity,
        series: &str,
        error: &FetchError,
    ) {
        tracing::error!(
            %symbol,
            granularity = granularity.as_str(),
            series,
            error = %error,
            "Series unavailable, skipping"
        );
    }

    /// Record the current snapshot of every symbol into its hourly and daily
    /// tracking buckets.
    pub async fn collect_snapshots(&self) -> SnapshotSummary {
        let mut summary = SnapshotSummary::default();

        for symbol in &self.symbols {
            let snapshot = match self.fetcher.fetch_snapshot(symbol).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::error!(%symbol, error = %e, "Snapshot unavailable, skipping");
                    summary.symbols_failed += 1;
                    continue;
                }
            };

            let mut failed = false;
            for granularity in Granularity::ALL {
                let bucket_start = granularity.bucket_start(snapshot.timestamp);
                let previous = self
                    .store
                    .previous_tracking_bucket(symbol, granularity, bucket_start);
                let bucket =
                    TrackingBucket::from_snapshot(&snapshot, granularity, previous.as_ref());

                match self.store.upsert_tracking_bucket(&bucket) {
                    Ok(()) => {
                        tracing::debug!(
                            %symbol,
                            granularity = granularity.as_str(),
                            bucket_start = %bucket.bucket_start,
                            price_change_pct = bucket.price_change_pct,
                            oi_change_pct = bucket.oi_change_pct,
                            "Tracking bucket updated"
                        );
                        summary.buckets_upserted += 1;
                    }
                    Err(e) => {
                        tracing::error!(%symbol, error = %e, "Failed to store tracking bucket");
                        failed = true;
                    }
                }
            }
            if failed {
                summary.symbols_failed += 1;
            }
        }
        summary
    }

    /// Run the detector for every symbol at `granularity`.
    pub fn run_detection(&self, granularity: Granularity) -> DetectionSummary {
        let mut summary = DetectionSummary::default();
        for symbol in &self.symbols {
            let outcome = self.detector.run_cycle(symbol, granularity);
            summary.anomalies += outcome.anomalies.len();
            summary.skipped_rules += outcome.skipped_rules;
            summary.persist_failures += outcome.persist_failures;
        }
        summary
    }

    /// Collect both horizons, record snapshots, then detect on both horizons.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        let timer = Instant::now();
        tracing::info!(symbols = self.symbols.len(), "Cycle started");

        let hourly = self.collect_history(Granularity::Hourly).await;
        let daily = self.collect_history(Granularity::Daily).await;
        let snapshots = if self.tracking.snapshots_enabled {
            Some(self.collect_snapshots().await)
        } else {
            None
        };
        let hourly_detection = self.run_detection(Granularity::Hourly);
        let daily_detection = self.run_detection(Granularity::Daily);

        let report = CycleReport {
            started_at,
            duration_secs: timer.elapsed().as_secs_f64(),
            hourly,
            daily,
            snapshots,
            hourly_detection,
            daily_detection,
        };

        metrics::record_cycle(report.duration_secs, report.anomalies());
        tracing::info!(
            duration_secs = report.duration_secs,
            anomalies = report.anomalies(),
            "Cycle complete"
        );
        report
    }
}
