//! History collected per tracking horizon.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::Granularity;

/// How much history each collection cycle refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Hourly history refreshed per cycle, in hours.
    #[serde(default = "default_hourly_history_hours")]
    pub hourly_history_hours: i64,
    /// Daily history refreshed per cycle, in days.
    #[serde(default = "default_daily_history_days")]
    pub daily_history_days: i64,
    /// Record live snapshots into tracking buckets each cycle.
    #[serde(default = "default_true")]
    pub snapshots_enabled: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            hourly_history_hours: default_hourly_history_hours(),
            daily_history_days: default_daily_history_days(),
            snapshots_enabled: true,
        }
    }
}

impl TrackingConfig {
    /// History to refresh for a granularity.
    #[must_use]
    pub const fn history(&self, granularity: Granularity) -> Duration {
        match granularity {
            Granularity::Hourly => Duration::hours(self.hourly_history_hours),
            Granularity::Daily => Duration::days(self.daily_history_days),
        }
    }
}

const fn default_hourly_history_hours() -> i64 {
    48
}

const fn default_daily_history_days() -> i64 {
    31
}

const fn default_true() -> bool {
    true
}
