//! Cross-metric correlation over timestamp-aligned series.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::stats::mean;
use crate::domain::TimePoint;

/// Minimum aligned pairs for a coefficient to be computed.
pub const MIN_CORRELATION_POINTS: usize = 3;

/// Strength and direction bucket for a correlation coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationBand {
    /// `r >= 0.7`
    StrongPositive,
    /// `0.4 <= r < 0.7`
    ModeratePositive,
    /// `0.2 <= r < 0.4`
    WeakPositive,
    /// `|r| < 0.2`
    Negligible,
    /// `-0.4 < r <= -0.2`
    WeakNegative,
    /// `-0.7 < r <= -0.4`
    ModerateNegative,
    /// `r <= -0.7`
    StrongNegative,
}

impl CorrelationBand {
    /// Band for a coefficient. Non-finite input is negligible.
    #[must_use]
    pub fn from_coefficient(r: f64) -> Self {
        if !r.is_finite() {
            return Self::Negligible;
        }
        let strength = r.abs();
        match (strength, r >= 0.0) {
            (s, true) if s >= 0.7 => Self::StrongPositive,
            (s, true) if s >= 0.4 => Self::ModeratePositive,
            (s, true) if s >= 0.2 => Self::WeakPositive,
            (s, false) if s >= 0.7 => Self::StrongNegative,
            (s, false) if s >= 0.4 => Self::ModerateNegative,
            (s, false) if s >= 0.2 => Self::WeakNegative,
            _ => Self::Negligible,
        }
    }

    /// Display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrongPositive => "strong_positive",
            Self::ModeratePositive => "moderate_positive",
            Self::WeakPositive => "weak_positive",
            Self::Negligible => "negligible",
            Self::WeakNegative => "weak_negative",
            Self::ModerateNegative => "moderate_negative",
            Self::StrongNegative => "strong_negative",
        }
    }
}

impl fmt::Display for CorrelationBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A correlation coefficient with the sample it came from.
///
/// `coefficient` is `0.0` when it could not be computed; `sample_size`
/// tells that case apart from a genuine zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// Coefficient in `[-1, 1]`.
    pub coefficient: f64,
    /// Number of aligned pairs.
    pub sample_size: usize,
    /// Strength and direction bucket.
    pub band: CorrelationBand,
}

impl Correlation {
    fn from_coefficient(coefficient: f64, sample_size: usize) -> Self {
        Self {
            coefficient,
            sample_size,
            band: CorrelationBand::from_coefficient(coefficient),
        }
    }

    /// Whether enough pairs were available for a coefficient.
    #[must_use]
    pub const fn is_sufficient(&self) -> bool {
        self.sample_size >= MIN_CORRELATION_POINTS
    }
}

/// Inner-join two series on timestamp, in the order of `left`.
#[must_use]
pub fn align(left: &[TimePoint], right: &[TimePoint]) -> Vec<(f64, f64)> {
    let by_ts: HashMap<_, f64> = right.iter().map(|p| (p.timestamp, p.value)).collect();
    left.iter()
        .filter_map(|p| by_ts.get(&p.timestamp).map(|r| (p.value, *r)))
        .collect()
}

/// Pearson correlation coefficient.
///
/// `0.0` with fewer than three pairs, mismatched lengths, zero variance in
/// either series, or a non-finite result.
#[must_use]
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() || xs.len() < MIN_CORRELATION_POINTS {
        return 0.0;
    }
    let (Some(mx), Some(my)) = (mean(xs), mean(ys)) else {
        return 0.0;
    };

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    let r = cov / denom;
    if r.is_finite() { r.clamp(-1.0, 1.0) } else { 0.0 }
}

/// Spearman rank correlation (Pearson over average ranks).
#[must_use]
pub fn spearman(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() {
        return 0.0;
    }
    pearson(&ranks(xs), &ranks(ys))
}

/// 1-based average ranks; ties share the mean of their positions.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for idx in &order[i..=j] {
            ranks[*idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Pearson correlation of two series aligned on timestamp.
#[must_use]
pub fn correlate(left: &[TimePoint], right: &[TimePoint]) -> Correlation {
    let pairs = align(left, right);
    let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
    Correlation::from_coefficient(pearson(&xs, &ys), xs.len())
}

/// Spearman correlation of two series aligned on timestamp.
#[must_use]
pub fn correlate_ranks(left: &[TimePoint], right: &[TimePoint]) -> Correlation {
    let pairs = align(left, right);
    let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
    Correlation::from_coefficient(spearman(&xs, &ys), xs.len())
}
