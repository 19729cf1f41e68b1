//! Metrics engine: pure statistics over ordered series.
//!
//! Nothing in here touches the store or the network; the detector and the
//! report builder read windows and pass plain slices in.

pub mod correlation;
pub mod stats;
pub mod trend;

pub use correlation::{
    Correlation, CorrelationBand, MIN_CORRELATION_POINTS, align, correlate, correlate_ranks,
    pearson, spearman,
};
pub use stats::{
    Outlier, leave_one_out_z_scores, mean, moving_average, pct_change, pct_change_between,
    period_changes, rolling_means, scan_outliers, std_dev, volatility, window_change, z_score,
    z_scores,
};
pub use trend::{Sentiment, SentimentLabel, Trend, classify_sentiment, classify_trend};

use serde::{Deserialize, Serialize};

use crate::domain::Granularity;

/// Short and long moving average periods.
pub const SHORT_MA_PERIOD: usize = 5;
/// Long moving average period.
pub const LONG_MA_PERIOD: usize = 20;

/// Standard moving averages for one series.
///
/// Each average is `None` when the series is shorter than its period.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovingAverages {
    /// 5-period average.
    pub ma5: Option<f64>,
    /// 20-period average.
    pub ma20: Option<f64>,
    /// 6-hour average (hourly series only).
    pub ma_6h: Option<f64>,
    /// 7-day average (daily series only).
    pub ma_7d: Option<f64>,
    /// 14-day average (daily series only).
    pub ma_14d: Option<f64>,
    /// Latest value relative to the 20-period average.
    pub ratio_to_ma20: Option<f64>,
}

impl MovingAverages {
    /// Compute the averages that apply to `granularity`.
    #[must_use]
    pub fn compute(values: &[f64], granularity: Granularity) -> Self {
        let ma20 = moving_average(values, LONG_MA_PERIOD);
        let ratio_to_ma20 = match (values.last(), ma20) {
            (Some(last), Some(avg)) if avg != 0.0 => Some(last / avg),
            _ => None,
        };
        let (ma_6h, ma_7d, ma_14d) = match granularity {
            Granularity::Hourly => (moving_average(values, 6), None, None),
            Granularity::Daily => (None, moving_average(values, 7), moving_average(values, 14)),
        };

        Self {
            ma5: moving_average(values, SHORT_MA_PERIOD),
            ma20,
            ma_6h,
            ma_7d,
            ma_14d,
            ratio_to_ma20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn moving_averages_by_granularity() {
        let values: Vec<f64> = (1..=24).map(f64::from).collect();

        let hourly = MovingAverages::compute(&values, Granularity::Hourly);
        assert_eq!(hourly.ma5, Some(22.0));
        assert_eq!(hourly.ma_6h, Some(21.5));
        assert_eq!(hourly.ma_7d, None);
        assert!((hourly.ratio_to_ma20.unwrap() - 24.0 / 14.5).abs() < 1e-9);

        let daily = MovingAverages::compute(&values[..10], Granularity::Daily);
        assert_eq!(daily.ma_7d, Some(7.0));
        assert_eq!(daily.ma_14d, None);
        assert_eq!(daily.ma20, None);
        assert_eq!(daily.ratio_to_ma20, None);
    }

    proptest! {
        #[test]
        fn z_scores_are_always_finite(values in prop::collection::vec(-1e9f64..1e9, 0..40)) {
            prop_assert!(z_scores(&values).iter().all(|z| z.is_finite()));
            prop_assert!(leave_one_out_z_scores(&values).iter().all(|z| z.is_finite()));
        }

        #[test]
        fn pearson_stays_in_unit_range(
            pairs in prop::collection::vec((-1e6f64..1e6, -1e6f64..1e6), 0..40)
        ) {
            let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let r = pearson(&xs, &ys);
            prop_assert!((-1.0..=1.0).contains(&r));
        }

        #[test]
        fn shifting_a_series_keeps_its_z_scores(
            values in prop::collection::vec(-1e3f64..1e3, 2..30),
            shift in -1e3f64..1e3,
        ) {
            prop_assume!(std_dev(&values).unwrap_or(0.0) > 1e-3);
            let shifted: Vec<f64> = values.iter().map(|v| v + shift).collect();
            for (a, b) in z_scores(&values).iter().zip(z_scores(&shifted)) {
                prop_assert!((a - b).abs() < 1e-6);
            }
        }
    }
}
