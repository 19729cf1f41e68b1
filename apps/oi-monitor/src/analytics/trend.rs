//! Trend and market sentiment classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of a series over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// More rising steps than falling ones.
    Increasing,
    /// More falling steps than rising ones.
    Decreasing,
    /// As many rising as falling steps (or no steps).
    Flat,
}

impl Trend {
    /// Display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Flat => "flat",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Majority vote over consecutive deltas.
#[must_use]
pub fn classify_trend(values: &[f64]) -> Trend {
    let (up, down) = values
        .windows(2)
        .fold((0usize, 0usize), |(up, down), w| match w[1].partial_cmp(&w[0]) {
            Some(std::cmp::Ordering::Greater) => (up + 1, down),
            Some(std::cmp::Ordering::Less) => (up, down + 1),
            _ => (up, down),
        });

    match up.cmp(&down) {
        std::cmp::Ordering::Greater => Trend::Increasing,
        std::cmp::Ordering::Less => Trend::Decreasing,
        std::cmp::Ordering::Equal => Trend::Flat,
    }
}

/// Positioning read from price, open interest and volume changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    /// Price, OI and volume all rising: new longs entering.
    StrongBullish,
    /// Price and OI rising on falling volume.
    ModerateBullish,
    /// Price rising while OI falls: short covering.
    PotentialBearish,
    /// Price falling while OI rises: new shorts entering.
    StrongBearish,
    /// Price and OI both falling: long liquidation.
    Unclear,
    /// Anything else.
    Neutral,
}

/// A sentiment label with its signed score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// Classification.
    pub label: SentimentLabel,
    /// Signed score in `[-2, 2]`.
    pub score: f64,
}

/// Classify sentiment from percentage changes of price, OI and volume.
#[must_use]
pub fn classify_sentiment(price_change: f64, oi_change: f64, volume_change: f64) -> Sentiment {
    let (label, score) = if price_change > 0.0 && oi_change > 0.0 {
        if volume_change > 0.0 {
            (SentimentLabel::StrongBullish, 2.0)
        } else {
            (SentimentLabel::ModerateBullish, 1.0)
        }
    } else if price_change > 0.0 && oi_change < 0.0 {
        (SentimentLabel::PotentialBearish, -0.5)
    } else if price_change < 0.0 && oi_change > 0.0 {
        (SentimentLabel::StrongBearish, -2.0)
    } else if price_change < 0.0 && oi_change < 0.0 {
        (SentimentLabel::Unclear, -0.2)
    } else {
        (SentimentLabel::Neutral, 0.0)
    };
    Sentiment { label, score }
}
