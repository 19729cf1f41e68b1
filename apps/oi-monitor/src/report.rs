//! Per-symbol tracking report over one horizon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::{
    Correlation, MovingAverages, Sentiment, Trend, classify_sentiment, classify_trend, correlate,
    correlate_ranks, pct_change, volatility, window_change,
};
use crate::domain::{
    AnomalyRecord, Granularity, MetricKind, Symbol, TimePoint, TrackingBucket, series_values,
};
use crate::store::{TimeSeriesStore, WindowQuery};

/// Anomalies included in a report.
const RECENT_ANOMALY_LIMIT: usize = 20;

/// Summary of one metric over the report window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Metric.
    pub metric: MetricKind,
    /// Latest value, if the series has any.
    pub current: Option<f64>,
    /// First-to-last change, in percent.
    pub change_pct: f64,
    /// Majority direction of the steps.
    pub trend: Trend,
    /// Standard moving averages.
    pub moving_averages: MovingAverages,
    /// Points in the window.
    pub points: usize,
}

/// The largest single-period price change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceMove {
    /// Start of the period the move ended in.
    pub timestamp: DateTime<Utc>,
    /// Change from the previous period, in percent.
    pub change_pct: f64,
}

/// Everything known about one symbol over one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolReport {
    /// Instrument.
    pub symbol: Symbol,
    /// Horizon.
    pub granularity: Granularity,
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
    /// Open interest, volume and price, in that order.
    pub metrics: Vec<MetricSummary>,
    /// Standard deviation of period price changes, in percent.
    pub price_volatility: f64,
    /// Largest absolute single-period price move.
    pub largest_price_move: Option<PriceMove>,
    /// Pearson correlation of open interest and volume.
    pub oi_volume: Correlation,
    /// Spearman correlation of open interest and volume.
    pub oi_volume_rank: Correlation,
    /// Pearson correlation of open interest and price.
    pub oi_price: Correlation,
    /// Positioning read from the window changes.
    pub sentiment: Sentiment,
    /// Latest tracking buckets, ascending.
    pub tracking: Vec<TrackingBucket>,
    /// Latest anomalies for the symbol, newest first.
    pub recent_anomalies: Vec<AnomalyRecord>,
}

impl SymbolReport {
    /// Summary for `metric`.
    #[must_use]
    pub fn metric(&self, metric: MetricKind) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.metric == metric)
    }
}

/// Build the report for `symbol` from the latest `points` of each series.
pub fn build_symbol_report(
    store: &dyn TimeSeriesStore,
    symbol: &Symbol,
    granularity: Granularity,
    points: usize,
) -> SymbolReport {
    let read =
        |metric| store.read_window(symbol, metric, granularity, WindowQuery::Latest(points));
    let open_interest = read(MetricKind::OpenInterest);
    let volume = read(MetricKind::Volume);
    let price = read(MetricKind::Price);

    let metrics: Vec<MetricSummary> = [
        (MetricKind::OpenInterest, &open_interest),
        (MetricKind::Volume, &volume),
        (MetricKind::Price, &price),
    ]
    .into_iter()
    .map(|(metric, series)| summarize(metric, series, granularity))
    .collect();

    let change = |metric| {
        metrics
            .iter()
            .find(|m: &&MetricSummary| m.metric == metric)
            .map_or(0.0, |m| m.change_pct)
    };
    let sentiment = classify_sentiment(
        change(MetricKind::Price),
        change(MetricKind::OpenInterest),
        change(MetricKind::Volume),
    );

    let price_values = series_values(&price);

    SymbolReport {
        symbol: symbol.clone(),
        granularity,
        generated_at: Utc::now(),
        price_volatility: volatility(&price_values),
        largest_price_move: largest_move(&price),
        oi_volume: correlate(&open_interest, &volume),
        oi_volume_rank: correlate_ranks(&open_interest, &volume),
        oi_price: correlate(&open_interest, &price),
        sentiment,
        tracking: store.read_tracking_buckets(symbol, granularity, points),
        recent_anomalies: store
            .recent_anomalies(Some(symbol), RECENT_ANOMALY_LIMIT)
            .into_iter()
            .filter(|a| a.granularity == granularity)
            .collect(),
        metrics,
    }
}

fn summarize(metric: MetricKind, series: &[TimePoint], granularity: Granularity) -> MetricSummary {
    let values = series_values(series);
    MetricSummary {
        metric,
        current: values.last().copied(),
        change_pct: window_change(&values),
        trend: classify_trend(&values),
        moving_averages: MovingAverages::compute(&values, granularity),
        points: values.len(),
    }
}

fn largest_move(price: &[TimePoint]) -> Option<PriceMove> {
    price
        .windows(2)
        .map(|w| PriceMove {
            timestamp: w[1].timestamp,
            change_pct: pct_change(w[1].value, w[0].value),
        })
        .max_by(|a, b| a.change_pct.abs().total_cmp(&b.change_pct.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{CorrelationBand, SentimentLabel};
    use crate::store::SqliteStore;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    fn seed(store: &SqliteStore, symbol: &Symbol, metric: MetricKind, values: &[f64]) {
        let points: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                TimePoint::new(
                    symbol.clone(),
                    metric,
                    Granularity::Daily,
                    start() + Duration::days(i as i64),
                    *v,
                )
            })
            .collect();
        store.upsert_points(&points);
    }

    #[test]
    fn report_summarizes_window() {
        let store = SqliteStore::in_memory().unwrap();
        let symbol = Symbol::new("BTCUSDT");
        seed(&store, &symbol, MetricKind::OpenInterest, &[100.0, 102.0, 104.0, 106.0, 110.0]);
        seed(&store, &symbol, MetricKind::Volume, &[10.0, 12.0, 14.0, 16.0, 20.0]);
        seed(&store, &symbol, MetricKind::Price, &[50.0, 51.0, 50.5, 55.0, 56.0]);

        let report = build_symbol_report(&store, &symbol, Granularity::Daily, 30);

        let oi = report.metric(MetricKind::OpenInterest).unwrap();
        assert_eq!(oi.current, Some(110.0));
        assert!((oi.change_pct - 10.0).abs() < 1e-9);
        assert_eq!(oi.trend, Trend::Increasing);
        assert_eq!(oi.points, 5);

        assert_eq!(report.oi_volume.band, CorrelationBand::StrongPositive);
        assert_eq!(report.sentiment.label, SentimentLabel::StrongBullish);

        let largest = report.largest_price_move.unwrap();
        assert_eq!(largest.timestamp, start() + Duration::days(3));
        assert!(report.price_volatility > 0.0);
    }

    #[test]
    fn empty_store_gives_neutral_report() {
        let store = SqliteStore::in_memory().unwrap();
        let report = build_symbol_report(&store, &Symbol::new("ETHUSDT"), Granularity::Hourly, 24);

        assert_eq!(report.metrics.len(), 3);
        assert!(report.metrics.iter().all(|m| m.current.is_none()));
        assert_eq!(report.sentiment.label, SentimentLabel::Neutral);
        assert_eq!(report.oi_volume.sample_size, 0);
        assert!(report.largest_price_move.is_none());
        assert!(report.tracking.is_empty());
    }

    #[test]
    fn report_serializes_to_json() {
        let store = SqliteStore::in_memory().unwrap();
        let report = build_symbol_report(&store, &Symbol::new("SOLUSDT"), Granularity::Daily, 30);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["symbol"], "SOLUSDT");
        assert_eq!(json["granularity"], "daily");
    }
}
