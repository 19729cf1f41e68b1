//! Detection rules.
//!
//! Each rule is a pure function over ordered values and returns a
//! [`RuleOutcome`]. "Baseline" is the window without its latest point.

use crate::analytics::{Correlation, MIN_CORRELATION_POINTS, mean, window_change, z_score};
use crate::config::{DetectionConfig, HorizonConfig};
use crate::domain::{AnomalyKind, MetricKind, Severity};

/// What a rule found.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    /// Anomaly kind.
    pub kind: AnomalyKind,
    /// Observed value (point value, change percent or coefficient).
    pub value: f64,
    /// Z-score, when the rule computes one.
    pub z_score: Option<f64>,
    /// Severity.
    pub severity: Severity,
    /// Summary with the triggering numbers.
    pub message: String,
}

/// Result of evaluating one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// The rule fired.
    Fired(Finding),
    /// Enough data, nothing unusual.
    Quiet,
    /// Not enough data to evaluate.
    Skipped {
        /// Points available.
        available: usize,
        /// Points required.
        required: usize,
    },
}

impl RuleOutcome {
    /// The finding, if the rule fired.
    #[must_use]
    pub fn into_finding(self) -> Option<Finding> {
        match self {
            Self::Fired(finding) => Some(finding),
            Self::Quiet | Self::Skipped { .. } => None,
        }
    }

    const fn skipped(available: usize, required: usize) -> Self {
        Self::Skipped {
            available,
            required,
        }
    }
}

/// Latest point of `metric` far from the baseline in z-score terms.
#[must_use]
pub fn outlier(metric: MetricKind, values: &[f64], config: &DetectionConfig) -> RuleOutcome {
    let required = config.min_outlier_points.max(2);
    let Some((&latest, baseline)) = values.split_last().filter(|_| values.len() >= required)
    else {
        return RuleOutcome::skipped(values.len(), required);
    };

    let z = z_score(latest, baseline);
    if z.abs() <= config.z_threshold {
        return RuleOutcome::Quiet;
    }

    let severity = if z.abs() > config.z_threshold + config.high_z_margin {
        Severity::High
    } else {
        Severity::Moderate
    };
    let baseline_mean = mean(baseline).unwrap_or_default();

    RuleOutcome::Fired(Finding {
        kind: AnomalyKind::outlier(metric),
        value: latest,
        z_score: Some(z),
        severity,
        message: format!(
            "{metric} {latest:.4} is {z:+.2} standard deviations from the baseline mean {baseline_mean:.4} ({} points)",
            baseline.len()
        ),
    })
}

/// Latest volume above `spike_multiplier` times the baseline mean.
#[must_use]
pub fn volume_spike(values: &[f64], config: &DetectionConfig) -> RuleOutcome {
    let Some((&latest, baseline)) = values.split_last().filter(|_| values.len() >= 2) else {
        return RuleOutcome::skipped(values.len(), 2);
    };

    let baseline_mean = mean(baseline).unwrap_or_default();
    if baseline_mean <= 0.0 || latest <= config.spike_multiplier * baseline_mean {
        return RuleOutcome::Quiet;
    }

    let ratio = latest / baseline_mean;
    let severity = if ratio >= 2.0 * config.spike_multiplier {
        Severity::High
    } else {
        Severity::Moderate
    };

    RuleOutcome::Fired(Finding {
        kind: AnomalyKind::VolumeSpike,
        value: latest,
        z_score: Some(z_score(latest, baseline)),
        severity,
        message: format!(
            "volume {latest:.2} is {ratio:.2}x the baseline mean {baseline_mean:.2} (threshold {:.1}x)",
            config.spike_multiplier
        ),
    })
}

/// Open interest and price moving in opposite directions over the window.
#[must_use]
pub fn oi_price_divergence(
    open_interest: &[f64],
    price: &[f64],
    horizon: &HorizonConfig,
) -> RuleOutcome {
    let available = open_interest.len().min(price.len());
    if available < horizon.min_divergence_points {
        return RuleOutcome::skipped(available, horizon.min_divergence_points);
    }

    let oi_change = window_change(open_interest);
    let price_change = window_change(price);

    let opposite = oi_change * price_change < 0.0;
    if !opposite
        || oi_change.abs() <= horizon.divergence_oi_pct
        || price_change.abs() <= horizon.divergence_price_pct
    {
        return RuleOutcome::Quiet;
    }

    let severity = if oi_change.abs() >= horizon.divergence_high_oi_pct
        && price_change.abs() >= horizon.divergence_high_price_pct
    {
        Severity::High
    } else {
        Severity::Moderate
    };

    RuleOutcome::Fired(Finding {
        kind: AnomalyKind::OiPriceDivergence,
        value: oi_change,
        z_score: None,
        severity,
        message: format!(
            "open interest {oi_change:+.2}% while price {price_change:+.2}% over {available} points"
        ),
    })
}

/// Open interest and volume strongly anti-correlated.
#[must_use]
pub fn correlation_breakdown(correlation: &Correlation, horizon: &HorizonConfig) -> RuleOutcome {
    if !correlation.is_sufficient() {
        return RuleOutcome::skipped(correlation.sample_size, MIN_CORRELATION_POINTS);
    }

    let r = correlation.coefficient;
    if r >= horizon.correlation_threshold {
        return RuleOutcome::Quiet;
    }

    let severity = if r <= horizon.correlation_high_threshold {
        Severity::High
    } else {
        Severity::Moderate
    };

    RuleOutcome::Fired(Finding {
        kind: AnomalyKind::OiVolumeCorrelation,
        value: r,
        z_score: None,
        severity,
        message: format!(
            "open interest / volume correlation {r:+.3} ({}) below {:+.2} over {} points",
            correlation.band, horizon.correlation_threshold, correlation.sample_size
        ),
    })
}
