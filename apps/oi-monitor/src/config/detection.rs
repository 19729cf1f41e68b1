//! Anomaly detection thresholds.

use serde::{Deserialize, Serialize};

use crate::domain::Granularity;

/// Detector configuration shared by both horizons, plus per-horizon rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// `|z|` above which the latest point is an outlier.
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    /// Extra `|z|` above the threshold that makes an outlier high severity.
    #[serde(default = "default_high_z_margin")]
    pub high_z_margin: f64,
    /// Latest volume above this multiple of the baseline mean is a spike.
    #[serde(default = "default_spike_multiplier")]
    pub spike_multiplier: f64,
    /// Points required before the outlier rule runs.
    #[serde(default = "default_min_outlier_points")]
    pub min_outlier_points: usize,
    /// Hourly (24h) horizon.
    #[serde(default = "HorizonConfig::hourly")]
    pub hourly: HorizonConfig,
    /// Daily (30d) horizon.
    #[serde(default = "HorizonConfig::daily")]
    pub daily: HorizonConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            high_z_margin: default_high_z_margin(),
            spike_multiplier: default_spike_multiplier(),
            min_outlier_points: default_min_outlier_points(),
            hourly: HorizonConfig::hourly(),
            daily: HorizonConfig::daily(),
        }
    }
}

impl DetectionConfig {
    /// Horizon settings for a granularity.
    #[must_use]
    pub const fn horizon(&self, granularity: Granularity) -> &HorizonConfig {
        match granularity {
            Granularity::Hourly => &self.hourly,
            Granularity::Daily => &self.daily,
        }
    }
}

/// Window length and rule thresholds for one tracking horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonConfig {
    /// Points in the evaluated window.
    pub window: usize,
    /// Minimum OI change (percent) for a divergence.
    pub divergence_oi_pct: f64,
    /// Minimum price change (percent) for a divergence.
    pub divergence_price_pct: f64,
    /// OI change (percent) that, together with the price one, makes it high.
    pub divergence_high_oi_pct: f64,
    /// Price change (percent) that, together with the OI one, makes it high.
    pub divergence_high_price_pct: f64,
    /// Points required before the divergence rule runs.
    pub min_divergence_points: usize,
    /// OI/volume correlation below this is a breakdown.
    pub correlation_threshold: f64,
    /// OI/volume correlation at or below this is a high-severity breakdown.
    pub correlation_high_threshold: f64,
}

impl HorizonConfig {
    /// 24 hourly points.
    #[must_use]
    pub const fn hourly() -> Self {
        Self {
            window: 24,
            divergence_oi_pct: 5.0,
            divergence_price_pct: 2.0,
            divergence_high_oi_pct: 10.0,
            divergence_high_price_pct: 5.0,
            min_divergence_points: 6,
            correlation_threshold: -0.7,
            correlation_high_threshold: -0.9,
        }
    }

    /// 30 daily points.
    #[must_use]
    pub const fn daily() -> Self {
        Self {
            window: 30,
            divergence_oi_pct: 10.0,
            divergence_price_pct: 5.0,
            divergence_high_oi_pct: 20.0,
            divergence_high_price_pct: 10.0,
            min_divergence_points: 7,
            correlation_threshold: -0.5,
            correlation_high_threshold: -0.9,
        }
    }
}

const fn default_z_threshold() -> f64 {
    2.5
}

const fn default_high_z_margin() -> f64 {
    1.0
}

const fn default_spike_multiplier() -> f64 {
    3.0
}

const fn default_min_outlier_points() -> usize {
    10
}
