//! Anomaly records produced by the detector and consumed by notifiers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Granularity, MetricKind, ParseEnumError, Symbol};

/// What an anomaly is about. Part of the deduplication key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Statistical outlier in open interest.
    OpenInterest,
    /// Statistical outlier in volume.
    Volume,
    /// Statistical outlier in price.
    Price,
    /// Volume far above its recent average.
    VolumeSpike,
    /// Open interest and price moving in opposite directions.
    OiPriceDivergence,
    /// Open interest and volume strongly anti-correlated.
    OiVolumeCorrelation,
}

impl AnomalyKind {
    /// Outlier kind for a metric.
    #[must_use]
    pub const fn outlier(metric: MetricKind) -> Self {
        match metric {
            MetricKind::OpenInterest => Self::OpenInterest,
            MetricKind::Volume => Self::Volume,
            MetricKind::Price => Self::Price,
        }
    }

    /// Storage and display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenInterest => "open_interest",
            Self::Volume => "volume",
            Self::Price => "price",
            Self::VolumeSpike => "volume_spike",
            Self::OiPriceDivergence => "oi_price_divergence",
            Self::OiVolumeCorrelation => "oi_volume_correlation",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open_interest" => Ok(Self::OpenInterest),
            "volume" => Ok(Self::Volume),
            "price" => Ok(Self::Price),
            "volume_spike" => Ok(Self::VolumeSpike),
            "oi_price_divergence" => Ok(Self::OiPriceDivergence),
            "oi_volume_correlation" => Ok(Self::OiVolumeCorrelation),
            other => Err(ParseEnumError {
                kind: "anomaly kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Two-level anomaly severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Crossed the primary threshold.
    Moderate,
    /// Crossed the secondary threshold.
    High,
}

impl Severity {
    /// Storage and display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moderate" => Ok(Self::Moderate),
            "high" => Ok(Self::High),
            other => Err(ParseEnumError {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

/// A detected anomaly.
///
/// Keyed by `(symbol, timestamp, kind, granularity)`. Once `notified` is set
/// it stays set, even when the same anomaly is detected again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Store row id, `None` until persisted.
    pub id: Option<i64>,
    /// Instrument.
    pub symbol: Symbol,
    /// Timestamp of the latest point in the evaluated window.
    pub timestamp: DateTime<Utc>,
    /// What was detected.
    pub kind: AnomalyKind,
    /// Horizon the window was taken from.
    pub granularity: Granularity,
    /// Observed value (point value, change percent or coefficient).
    pub value: f64,
    /// Z-score of the observation, when the rule computes one.
    pub z_score: Option<f64>,
    /// Severity.
    pub severity: Severity,
    /// Human-readable summary with the numbers that triggered the rule.
    pub message: String,
    /// Whether a notifier has delivered this anomaly.
    pub notified: bool,
}
