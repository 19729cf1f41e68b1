//! Tracking buckets: one combined snapshot per symbol and period.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Granularity, MarketSnapshot, Symbol};
use crate::analytics::pct_change;

/// Price, volume and open interest for one bucket, with the change
/// against the previous stored bucket of the same granularity.
///
/// One row per `(symbol, granularity, bucket_start)`; re-runs update in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingBucket {
    /// Instrument.
    pub symbol: Symbol,
    /// Bucket period.
    pub granularity: Granularity,
    /// Start of the bucket (UTC, truncated to the period).
    pub bucket_start: DateTime<Utc>,
    /// Last traded price.
    pub price: f64,
    /// Rolling 24h traded volume.
    pub volume: f64,
    /// Open interest.
    pub open_interest: f64,
    /// Price change vs the previous bucket, in percent.
    pub price_change_pct: f64,
    /// Volume change vs the previous bucket, in percent.
    pub volume_change_pct: f64,
    /// Open interest change vs the previous bucket, in percent.
    pub oi_change_pct: f64,
}

impl TrackingBucket {
    /// Build the bucket for `snapshot`, computing changes against `previous`.
    ///
    /// Without a previous bucket every change is `0`.
    #[must_use]
    pub fn from_snapshot(
        snapshot: &MarketSnapshot,
        granularity: Granularity,
        previous: Option<&Self>,
    ) -> Self {
        let change = |current: f64, prev: Option<f64>| prev.map_or(0.0, |p| pct_change(current, p));

        Self {
            symbol: snapshot.symbol.clone(),
            granularity,
            bucket_start: granularity.bucket_start(snapshot.timestamp),
            price: snapshot.last_price,
            volume: snapshot.volume,
            open_interest: snapshot.open_interest,
            price_change_pct: change(snapshot.last_price, previous.map(|p| p.price)),
            volume_change_pct: change(snapshot.volume, previous.map(|p| p.volume)),
            oi_change_pct: change(snapshot.open_interest, previous.map(|p| p.open_interest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(price: f64, volume: f64, oi: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: Symbol::new("BTCUSDT"),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 10, 42, 0).unwrap(),
            open_interest: oi,
            last_price: price,
            volume,
            quote_volume: price * volume,
            trade_count: 10,
            price_change_percent: 0.0,
        }
    }

    #[test]
    fn first_bucket_has_zero_changes() {
        let bucket =
            TrackingBucket::from_snapshot(&snapshot(100.0, 10.0, 50.0), Granularity::Hourly, None);
        assert_eq!(
            bucket.bucket_start,
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(bucket.price_change_pct, 0.0);
        assert_eq!(bucket.oi_change_pct, 0.0);
    }

    #[test]
    fn changes_are_relative_to_previous_bucket() {
        let previous =
            TrackingBucket::from_snapshot(&snapshot(100.0, 10.0, 50.0), Granularity::Hourly, None);
        let bucket = TrackingBucket::from_snapshot(
            &snapshot(110.0, 5.0, 0.0),
            Granularity::Hourly,
            Some(&previous),
        );
        assert!((bucket.price_change_pct - 10.0).abs() < 1e-9);
        assert!((bucket.volume_change_pct + 50.0).abs() < 1e-9);
        assert!((bucket.oi_change_pct + 100.0).abs() < 1e-9);
    }
}
