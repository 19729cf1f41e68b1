//! Time-series identity: metric kinds, granularities and points.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use super::Symbol;

/// Error returned when a stored or configured label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} label: {value}")]
pub struct ParseEnumError {
    /// Which enum failed to parse.
    pub kind: &'static str,
    /// The offending input.
    pub value: String,
}

/// Which market quantity a series measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Aggregate open interest (contracts outstanding).
    OpenInterest,
    /// Traded base-asset volume.
    Volume,
    /// Close price.
    Price,
}

impl MetricKind {
    /// All metric kinds, in detection order.
    pub const ALL: [Self; 3] = [Self::OpenInterest, Self::Volume, Self::Price];

    /// Storage and display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenInterest => "open_interest",
            Self::Volume => "volume",
            Self::Price => "price",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open_interest" => Ok(Self::OpenInterest),
            "volume" => Ok(Self::Volume),
            "price" => Ok(Self::Price),
            other => Err(ParseEnumError {
                kind: "metric",
                value: other.to_string(),
            }),
        }
    }
}

/// Sampling period of a series and of its tracking horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One point per hour (24-hour tracking horizon).
    Hourly,
    /// One point per day (30-day tracking horizon).
    Daily,
}

impl Granularity {
    /// Both granularities, shortest first.
    pub const ALL: [Self; 2] = [Self::Hourly, Self::Daily];

    /// Storage and display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }

    /// Interval string understood by the upstream API.
    #[must_use]
    pub const fn interval(self) -> &'static str {
        match self {
            Self::Hourly => "1h",
            Self::Daily => "1d",
        }
    }

    /// Length of one period.
    #[must_use]
    pub const fn period(self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
        }
    }

    /// Start of the bucket containing `ts`.
    #[must_use]
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        ts.duration_trunc(self.period()).unwrap_or(ts)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" | "1h" => Ok(Self::Hourly),
            "daily" | "1d" => Ok(Self::Daily),
            other => Err(ParseEnumError {
                kind: "granularity",
                value: other.to_string(),
            }),
        }
    }
}

/// A single observation of one metric for one symbol.
///
/// Unique per `(symbol, metric, granularity, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    /// Instrument.
    pub symbol: Symbol,
    /// Measured quantity.
    pub metric: MetricKind,
    /// Sampling period.
    pub granularity: Granularity,
    /// Period start (UTC).
    pub timestamp: DateTime<Utc>,
    /// Observed value.
    pub value: f64,
}

impl TimePoint {
    /// Create a new time point.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        metric: MetricKind,
        granularity: Granularity,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Self {
        Self {
            symbol,
            metric,
            granularity,
            timestamp,
            value,
        }
    }
}

/// Values of a series in order, for the statistics functions.
#[must_use]
pub fn series_values(points: &[TimePoint]) -> Vec<f64> {
    points.iter().map(|p| p.value).collect()
}

/// A request for one series over a time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchWindowRequest {
    /// Instrument.
    pub symbol: Symbol,
    /// Requested quantity.
    pub metric: MetricKind,
    /// Inclusive range start.
    pub start: DateTime<Utc>,
    /// Inclusive range end.
    pub end: DateTime<Utc>,
    /// Sampling period.
    pub granularity: Granularity,
}

impl FetchWindowRequest {
    /// Request the `lookback` period ending at `end`.
    #[must_use]
    pub fn ending_at(
        symbol: Symbol,
        metric: MetricKind,
        granularity: Granularity,
        end: DateTime<Utc>,
        lookback: Duration,
    ) -> Self {
        Self {
            symbol,
            metric,
            start: end - lookback,
            end,
            granularity,
        }
    }
}
