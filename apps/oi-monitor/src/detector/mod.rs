//! Anomaly detector.
//!
//! One detection cycle per `(symbol, granularity)`:
//!
//! ```text
//! CollectWindow -> ComputeStats -> Classify -> Persist
//! ```
//!
//! Nothing carries over between cycles. Anomalies are stamped with the latest
//! timestamp of the series that triggered them, so running a cycle twice on
//! the same data upserts the same rows and leaves `notified` alone.

pub mod rules;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use rules::{Finding, RuleOutcome};

use crate::analytics::{Correlation, correlate};
use crate::config::DetectionConfig;
use crate::domain::{AnomalyRecord, Granularity, MetricKind, Symbol, TimePoint, series_values};
use crate::observability::metrics;
use crate::store::{TimeSeriesStore, WindowQuery};

/// Stage of a detection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Read the latest window of every series.
    CollectWindow,
    /// Derive values and correlations from the window.
    ComputeStats,
    /// Evaluate every rule.
    Classify,
    /// Upsert the findings.
    Persist,
}

impl CyclePhase {
    /// Log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CollectWindow => "collect_window",
            Self::ComputeStats => "compute_stats",
            Self::Classify => "classify",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one detection cycle.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    /// Anomalies found and persisted, with their store ids.
    pub anomalies: Vec<AnomalyRecord>,
    /// Rules skipped for lack of data.
    pub skipped_rules: usize,
    /// Findings that could not be persisted.
    pub persist_failures: usize,
}

/// The window a cycle works on.
#[derive(Debug, Default)]
struct Window {
    open_interest: Vec<TimePoint>,
    volume: Vec<TimePoint>,
    price: Vec<TimePoint>,
}

impl Window {
    fn series(&self, metric: MetricKind) -> &[TimePoint] {
        match metric {
            MetricKind::OpenInterest => &self.open_interest,
            MetricKind::Volume => &self.volume,
            MetricKind::Price => &self.price,
        }
    }

    fn latest(&self, metric: MetricKind) -> Option<DateTime<Utc>> {
        self.series(metric).last().map(|p| p.timestamp)
    }

    fn latest_of(&self, metrics: &[MetricKind]) -> Option<DateTime<Utc>> {
        metrics.iter().filter_map(|m| self.latest(*m)).max()
    }
}

/// Values and correlations derived from a [`Window`].
#[derive(Debug)]
struct WindowStats {
    open_interest: Vec<f64>,
    volume: Vec<f64>,
    price: Vec<f64>,
    oi_volume: Correlation,
}

impl WindowStats {
    fn values(&self, metric: MetricKind) -> &[f64] {
        match metric {
            MetricKind::OpenInterest => &self.open_interest,
            MetricKind::Volume => &self.volume,
            MetricKind::Price => &self.price,
        }
    }
}

/// Runs the four detection rules against stored series.
pub struct AnomalyDetector {
    store: Arc<dyn TimeSeriesStore>,
    config: DetectionConfig,
}

impl fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AnomalyDetector {
    /// Create a detector over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TimeSeriesStore>, config: DetectionConfig) -> Self {
        Self { store, config }
    }

    /// Detection thresholds in use.
    #[must_use]
    pub const fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Run one detection cycle for a symbol and horizon.
    pub fn run_cycle(&self, symbol: &Symbol, granularity: Granularity) -> DetectionOutcome {
        let span = tracing::debug_span!(
            "detection_cycle",
            %symbol,
            granularity = granularity.as_str()
        );
        let _enter = span.enter();

        let window = self.collect_window(symbol, granularity);
        let stats = Self::compute_stats(&window);
        let (findings, skipped_rules) = self.classify(&window, &stats, granularity);
        let mut outcome = self.persist(symbol, granularity, findings);
        outcome.skipped_rules = skipped_rules;

        tracing::debug!(
            anomalies = outcome.anomalies.len(),
            skipped_rules,
            persist_failures = outcome.persist_failures,
            "Detection cycle complete"
        );
        outcome
    }

    fn collect_window(&self, symbol: &Symbol, granularity: Granularity) -> Window {
        let points = self.config.horizon(granularity).window;
        tracing::trace!(phase = %CyclePhase::CollectWindow, points);

        let read = |metric| {
            self.store
                .read_window(symbol, metric, granularity, WindowQuery::Latest(points))
        };
        Window {
            open_interest: read(MetricKind::OpenInterest),
            volume: read(MetricKind::Volume),
            price: read(MetricKind::Price),
        }
    }

    fn compute_stats(window: &Window) -> WindowStats {
        tracing::trace!(phase = %CyclePhase::ComputeStats);
        WindowStats {
            open_interest: series_values(&window.open_interest),
            volume: series_values(&window.volume),
            price: series_values(&window.price),
            oi_volume: correlate(&window.open_interest, &window.volume),
        }
    }

    fn classify(
        &self,
        window: &Window,
        stats: &WindowStats,
        granularity: Granularity,
    ) -> (Vec<(Finding, DateTime<Utc>)>, usize) {
        tracing::trace!(phase = %CyclePhase::Classify);
        let horizon = self.config.horizon(granularity);

        let mut evaluated = Vec::with_capacity(6);
        for metric in MetricKind::ALL {
            evaluated.push((
                metric.as_str(),
                rules::outlier(metric, stats.values(metric), &self.config),
                window.latest(metric),
            ));
        }
        evaluated.push((
            "volume_spike",
            rules::volume_spike(&stats.volume, &self.config),
            window.latest(MetricKind::Volume),
        ));
        evaluated.push((
            "oi_price_divergence",
            rules::oi_price_divergence(&stats.open_interest, &stats.price, horizon),
            window.latest_of(&[MetricKind::OpenInterest, MetricKind::Price]),
        ));
        evaluated.push((
            "oi_volume_correlation",
            rules::correlation_breakdown(&stats.oi_volume, horizon),
            window.latest_of(&[MetricKind::OpenInterest, MetricKind::Volume]),
        ));

        let mut findings = Vec::new();
        let mut skipped = 0;
        for (rule, outcome, timestamp) in evaluated {
            match (outcome, timestamp) {
                (RuleOutcome::Fired(finding), Some(ts)) => findings.push((finding, ts)),
                (RuleOutcome::Skipped { available, required }, _) => {
                    tracing::debug!(rule, available, required, "Rule skipped, not enough data");
                    skipped += 1;
                }
                (RuleOutcome::Quiet | RuleOutcome::Fired(_), _) => {}
            }
        }
        (findings, skipped)
    }

    fn persist(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        findings: Vec<(Finding, DateTime<Utc>)>,
    ) -> DetectionOutcome {
        tracing::trace!(phase = %CyclePhase::Persist, findings = findings.len());
        let mut outcome = DetectionOutcome::default();

        for (finding, timestamp) in findings {
            let mut record = AnomalyRecord {
                id: None,
                symbol: symbol.clone(),
                timestamp,
                kind: finding.kind,
                granularity,
                value: finding.value,
                z_score: finding.z_score,
                severity: finding.severity,
                message: finding.message,
                notified: false,
            };

            match self.store.upsert_anomaly(&record) {
                Ok(id) => {
                    record.id = Some(id);
                    tracing::info!(
                        id,
                        kind = record.kind.as_str(),
                        severity = record.severity.as_str(),
                        timestamp = %record.timestamp,
                        message = %record.message,
                        "Anomaly detected"
                    );
                    metrics::record_anomaly(
                        record.kind.as_str(),
                        granularity.as_str(),
                        record.severity.as_str(),
                    );
                    outcome.anomalies.push(record);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        kind = record.kind.as_str(),
                        "Failed to persist anomaly"
                    );
                    outcome.persist_failures += 1;
                }
            }
        }
        outcome
    }
}
