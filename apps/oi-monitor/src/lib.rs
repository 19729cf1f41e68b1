// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::cast_possible_wrap,
        clippy::items_after_statements
    )
)]

//! OI Monitor - Derivatives Open-Interest Monitor
//!
//! Collects open interest, volume and price for a fixed set of perpetual
//! futures symbols, persists them idempotently and flags statistical
//! anomalies.
//!
//! # Layout
//!
//! - **domain**: symbols, series, tracking buckets, anomaly records
//! - **analytics**: pure statistics (z-scores, correlation bands, trends)
//! - **fetcher**: paginated, rate-limited REST client with retry and clock
//!   correction
//! - **store**: persistence port and its SQLite adapter
//! - **detector**: the four anomaly rules, one cycle per symbol and horizon
//! - **orchestrator**: collection and detection cycles over all symbols
//! - **notify**: downstream delivery with an at-most-once notified flag
//! - **report**: per-symbol summaries
//! - **config** / **observability**: YAML configuration, tracing and metrics
//!
//! # Data flow
//!
//! ```text
//! fetcher ──► store ──► detector ──► store (anomalies) ──► notify
//!                 └──► report
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Pure statistics over ordered series.
pub mod analytics;

/// YAML configuration with environment interpolation.
pub mod config;

/// Anomaly detection rules and cycle.
pub mod detector;

/// Domain types shared by every layer.
pub mod domain;

/// Market data REST client.
pub mod fetcher;

/// Anomaly delivery.
pub mod notify;

/// Tracing and Prometheus metrics.
pub mod observability;

/// Collection and detection cycles.
pub mod orchestrator;

/// Per-symbol reports.
pub mod report;

/// Time-series persistence.
pub mod store;

pub use config::{Config, ConfigError, load_config};
pub use detector::{AnomalyDetector, DetectionOutcome};
pub use domain::{
    AnomalyKind, AnomalyRecord, Granularity, MetricKind, Severity, Symbol, TimePoint,
    TrackingBucket,
};
pub use fetcher::{FetchError, MarketDataFetcher};
pub use notify::{AnomalyNotifier, DispatchSummary, LogNotifier, NotifyError, dispatch_unnotified};
pub use orchestrator::{CollectionOrchestrator, CycleReport};
pub use report::{SymbolReport, build_symbol_report};
pub use store::{SqliteStore, StoreError, TimeSeriesStore, WindowQuery};
