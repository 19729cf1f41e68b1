//! Configuration loading, validation and environment variable interpolation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use oi_monitor::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("deploy/oi-monitor.yaml"))?;
//!
//! println!("z threshold: {}", config.detection.z_threshold);
//! ```
//!
//! Every section has defaults, so an empty document is a valid config.

mod detection;
mod exchange;
mod fetch;
mod observability;
mod schedule;
mod storage;
mod tracking;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use detection::{DetectionConfig, HorizonConfig};
pub use exchange::ExchangeConfig;
pub use fetch::{FetchConfig, RetryConfig};
pub use observability::ObservabilityConfig;
pub use schedule::ScheduleConfig;
pub use storage::StorageConfig;
pub use tracking::TrackingConfig;

use crate::domain::Symbol;

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Instruments to track.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<Symbol>,
    /// Upstream API connection.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Fetcher pacing, retry and pagination.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// History collected per horizon.
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Anomaly detection thresholds.
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Store location.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Cycle scheduling.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            exchange: ExchangeConfig::default(),
            fetch: FetchConfig::default(),
            tracking: TrackingConfig::default(),
            detection: DetectionConfig::default(),
            storage: StorageConfig::default(),
            schedule: ScheduleConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn default_symbols() -> Vec<Symbol> {
    ["BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "DOGEUSDT"]
        .into_iter()
        .map(Symbol::new)
        .collect()
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.symbols.is_empty() {
        return invalid("symbols must not be empty");
    }
    if let Some(bad) = config.symbols.iter().find(|s| !s.is_valid()) {
        return Err(ConfigError::ValidationError(format!(
            "symbol '{bad}' must be alphanumeric"
        )));
    }

    if config.exchange.base_url.trim().is_empty() {
        return invalid("exchange.base_url must not be empty");
    }
    if config.exchange.timeout_secs == 0 {
        return invalid("exchange.timeout_secs must be positive");
    }

    let fetch = &config.fetch;
    if fetch.retry.max_attempts == 0 {
        return invalid("fetch.retry.max_attempts must be at least 1");
    }
    if !(0.0..=1.0).contains(&fetch.retry.jitter_factor) {
        return invalid("fetch.retry.jitter_factor must be between 0.0 and 1.0");
    }
    if !(1..=1500).contains(&fetch.kline_page_size) {
        return invalid("fetch.kline_page_size must be between 1 and 1500");
    }
    if !(1..=500).contains(&fetch.open_interest_page_size) {
        return invalid("fetch.open_interest_page_size must be between 1 and 500");
    }
    if fetch.open_interest_max_span_hours <= 0
        || fetch.candle_lookback_days <= 0
        || fetch.open_interest_lookback_days <= 0
    {
        return invalid("fetch lookbacks and spans must be positive");
    }
    if fetch.listing_buffer_days < 0 {
        return invalid("fetch.listing_buffer_days must not be negative");
    }
    if fetch.max_chunks == 0 {
        return invalid("fetch.max_chunks must be positive");
    }

    if config.tracking.hourly_history_hours <= 0 || config.tracking.daily_history_days <= 0 {
        return invalid("tracking history lengths must be positive");
    }

    let detection = &config.detection;
    if detection.z_threshold <= 0.0 || detection.high_z_margin < 0.0 {
        return invalid("detection.z_threshold must be positive");
    }
    if detection.spike_multiplier <= 1.0 {
        return invalid("detection.spike_multiplier must be greater than 1.0");
    }
    let history = [
        (
            "hourly",
            &detection.hourly,
            config.tracking.hourly_history_hours,
            "tracking.hourly_history_hours",
        ),
        (
            "daily",
            &detection.daily,
            config.tracking.daily_history_days,
            "tracking.daily_history_days",
        ),
    ];
    for (name, horizon, periods, history_key) in history {
        if horizon.window < 3 {
            return Err(ConfigError::ValidationError(format!(
                "detection.{name}.window must be at least 3"
            )));
        }
        // The newest period is still open, so history must cover one more.
        if usize::try_from(periods).unwrap_or(0) <= horizon.window {
            return Err(ConfigError::ValidationError(format!(
                "{history_key} ({periods}) must exceed detection.{name}.window ({})",
                horizon.window
            )));
        }
        if !(-1.0..=0.0).contains(&horizon.correlation_threshold) {
            return Err(ConfigError::ValidationError(format!(
                "detection.{name}.correlation_threshold must be between -1.0 and 0.0"
            )));
        }
    }

    if config.schedule.update_interval_secs == 0 {
        return invalid("schedule.update_interval_secs must be positive");
    }

    if let Some(addr) = &config.observability.metrics_addr {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "observability.metrics_addr '{addr}' is not a socket address"
            )));
        }
    }

    Ok(())
}
