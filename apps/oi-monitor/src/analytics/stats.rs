//! Rolling statistics over ordered `f64` series.
//!
//! Population standard deviation (ddof = 0) is used everywhere so that the
//! z-scores seen by the detector and by reports agree. Degenerate inputs
//! (empty series, zero deviation, zero previous value) produce neutral
//! values rather than NaN or infinity.

/// Arithmetic mean. `None` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation. `None` for an empty slice.
#[must_use]
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg) * (v - avg)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Z-score of `value` against `baseline`.
///
/// Returns `0.0` when the baseline is empty or has zero deviation.
#[must_use]
pub fn z_score(value: f64, baseline: &[f64]) -> f64 {
    let (Some(avg), Some(sd)) = (mean(baseline), std_dev(baseline)) else {
        return 0.0;
    };
    if sd == 0.0 || !sd.is_finite() {
        return 0.0;
    }
    let z = (value - avg) / sd;
    if z.is_finite() { z } else { 0.0 }
}

/// Z-score of every value against the whole window (itself included).
#[must_use]
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| z_score(*v, values)).collect()
}

/// Z-score of every value against the window without that value.
///
/// Keeps a single extreme reading from inflating the deviation it is
/// measured against.
#[must_use]
pub fn leave_one_out_z_scores(values: &[f64]) -> Vec<f64> {
    let mut baseline = Vec::with_capacity(values.len().saturating_sub(1));
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            baseline.clear();
            baseline.extend(
                values
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, x)| *x),
            );
            z_score(*v, &baseline)
        })
        .collect()
}

/// A value flagged by [`scan_outliers`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outlier {
    /// Position in the scanned series.
    pub index: usize,
    /// The value.
    pub value: f64,
    /// Leave-one-out z-score.
    pub z_score: f64,
}

/// Every value whose leave-one-out `|z|` exceeds `threshold`.
#[must_use]
pub fn scan_outliers(values: &[f64], threshold: f64) -> Vec<Outlier> {
    leave_one_out_z_scores(values)
        .into_iter()
        .enumerate()
        .filter(|(_, z)| z.abs() > threshold)
        .map(|(index, z_score)| Outlier {
            index,
            value: values[index],
            z_score,
        })
        .collect()
}

/// Percentage change from `previous` to `current`.
///
/// `0.0` when `previous` is zero or either operand is not finite.
#[must_use]
pub fn pct_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

/// Percentage change between optional readings; `0.0` if either is missing.
#[must_use]
pub fn pct_change_between(current: Option<f64>, previous: Option<f64>) -> f64 {
    match (current, previous) {
        (Some(c), Some(p)) => pct_change(c, p),
        _ => 0.0,
    }
}

/// Percentage change between consecutive values.
#[must_use]
pub fn period_changes(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| pct_change(w[1], w[0])).collect()
}

/// Change from the first to the last value, in percent.
#[must_use]
pub fn window_change(values: &[f64]) -> f64 {
    pct_change_between(values.last().copied(), values.first().copied())
}

/// Volatility: population standard deviation of the period changes.
///
/// `0.0` with fewer than two values.
#[must_use]
pub fn volatility(values: &[f64]) -> f64 {
    std_dev(&period_changes(values)).unwrap_or(0.0)
}

/// Mean of the last `period` values. `None` when history is too short.
#[must_use]
pub fn moving_average(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    mean(&values[values.len() - period..])
}

/// Trailing moving average at every index.
///
/// Indices with fewer than `period` values of history are `None`.
#[must_use]
pub fn rolling_means(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| moving_average(&values[..=i], period))
        .collect()
}
