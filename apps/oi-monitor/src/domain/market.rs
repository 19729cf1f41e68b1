//! Market data shapes returned by the fetcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Granularity, MetricKind, Symbol, TimePoint};

/// One OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Period start.
    pub open_time: DateTime<Utc>,
    /// Period end (last millisecond of the period).
    pub close_time: DateTime<Utc>,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Base-asset volume.
    pub volume: f64,
    /// Quote-asset volume.
    pub quote_volume: f64,
    /// Number of trades.
    pub trades: u64,
}

impl Candle {
    /// Whether the period had ended at `now`.
    #[must_use]
    pub fn is_closed_at(&self, now: DateTime<Utc>) -> bool {
        self.close_time < now
    }

    /// Project the candle into its price (close) and volume points.
    #[must_use]
    pub fn to_points(&self, symbol: &Symbol, granularity: Granularity) -> [TimePoint; 2] {
        [
            TimePoint::new(
                symbol.clone(),
                MetricKind::Price,
                granularity,
                self.open_time,
                self.close,
            ),
            TimePoint::new(
                symbol.clone(),
                MetricKind::Volume,
                granularity,
                self.open_time,
                self.volume,
            ),
        ]
    }
}

/// Current open interest and 24h ticker for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Instrument.
    pub symbol: Symbol,
    /// Exchange timestamp of the open interest reading.
    pub timestamp: DateTime<Utc>,
    /// Open interest (contracts).
    pub open_interest: f64,
    /// Last traded price.
    pub last_price: f64,
    /// Rolling 24h base-asset volume.
    pub volume: f64,
    /// Rolling 24h quote-asset volume.
    pub quote_volume: f64,
    /// Rolling 24h trade count.
    pub trade_count: u64,
    /// Rolling 24h price change, in percent.
    pub price_change_percent: f64,
}
