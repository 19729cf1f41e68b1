//! Domain types shared by every layer.
//!
//! - `symbol`: instrument identifier value object
//! - `series`: metric kinds, granularities and time points
//! - `tracking`: per-bucket snapshots with change percentages
//! - `anomaly`: anomaly records, kinds and severity
//! - `market`: candles and live market snapshots

pub mod anomaly;
pub mod market;
pub mod series;
pub mod symbol;
pub mod tracking;

pub use anomaly::{AnomalyKind, AnomalyRecord, Severity};
pub use market::{Candle, MarketSnapshot};
pub use series::{
    FetchWindowRequest, Granularity, MetricKind, ParseEnumError, TimePoint, series_values,
};
pub use symbol::Symbol;
pub use tracking::TrackingBucket;

use chrono::{DateTime, Utc};

/// Convert epoch milliseconds into a UTC timestamp.
///
/// Returns `None` for values outside chrono's representable range.
#[must_use]
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}
