//! Collection cycle scheduling.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Delay between the start of two collection cycles, in seconds.
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
    /// Run a single cycle and exit.
    #[serde(default)]
    pub run_once: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval_secs(),
            run_once: false,
        }
    }
}

impl ScheduleConfig {
    /// Cycle interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

const fn default_update_interval_secs() -> u64 {
    60
}
