//! Fetcher pacing, retry and pagination configuration.

use serde::{Deserialize, Serialize};

/// Fetcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Minimum delay between any two upstream calls, in milliseconds.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Retry and backoff behavior.
    #[serde(default)]
    pub retry: RetryConfig,
    /// How long a server-time offset stays valid, in seconds.
    #[serde(default = "default_server_time_ttl_secs")]
    pub server_time_ttl_secs: u64,
    /// Maximum history available for candles, in days.
    #[serde(default = "default_candle_lookback_days")]
    pub candle_lookback_days: i64,
    /// Maximum history available for open interest, in days.
    #[serde(default = "default_open_interest_lookback_days")]
    pub open_interest_lookback_days: i64,
    /// Rows requested per candle call.
    #[serde(default = "default_kline_page_size")]
    pub kline_page_size: u32,
    /// Rows requested per open interest call.
    #[serde(default = "default_open_interest_page_size")]
    pub open_interest_page_size: u32,
    /// Widest time span one open interest call may cover, in hours.
    #[serde(default = "default_open_interest_max_span_hours")]
    pub open_interest_max_span_hours: i64,
    /// Days after listing before data is considered reliable.
    #[serde(default = "default_listing_buffer_days")]
    pub listing_buffer_days: i64,
    /// Upper bound on chunks per fetch.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: default_min_request_interval_ms(),
            retry: RetryConfig::default(),
            server_time_ttl_secs: default_server_time_ttl_secs(),
            candle_lookback_days: default_candle_lookback_days(),
            open_interest_lookback_days: default_open_interest_lookback_days(),
            kline_page_size: default_kline_page_size(),
            open_interest_page_size: default_open_interest_page_size(),
            open_interest_max_span_hours: default_open_interest_max_span_hours(),
            listing_buffer_days: default_listing_buffer_days(),
            max_chunks: default_max_chunks(),
        }
    }
}

/// Retry configuration.
///
/// Transient failures back off `base_delay_ms * 2^attempt`; HTTP 429 uses the
/// same ladder from `rate_limit_base_delay_ms`; HTTP 418 waits
/// `ban_cooldown_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per request for transient failures (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First transient backoff, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// First rate-limit backoff, in milliseconds.
    #[serde(default = "default_rate_limit_base_delay_ms")]
    pub rate_limit_base_delay_ms: u64,
    /// Retries allowed after 429/418 responses per request.
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    /// Pause after an HTTP 418 ban, in seconds.
    #[serde(default = "default_ban_cooldown_secs")]
    pub ban_cooldown_secs: u64,
    /// Random spread applied to backoffs (0.0 disables jitter).
    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            rate_limit_base_delay_ms: default_rate_limit_base_delay_ms(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            ban_cooldown_secs: default_ban_cooldown_secs(),
            jitter_factor: 0.0,
        }
    }
}

const fn default_min_request_interval_ms() -> u64 {
    500
}

const fn default_server_time_ttl_secs() -> u64 {
    300
}

const fn default_candle_lookback_days() -> i64 {
    90
}

const fn default_open_interest_lookback_days() -> i64 {
    30
}

const fn default_kline_page_size() -> u32 {
    500
}

const fn default_open_interest_page_size() -> u32 {
    500
}

const fn default_open_interest_max_span_hours() -> i64 {
    24
}

const fn default_listing_buffer_days() -> i64 {
    1
}

const fn default_max_chunks() -> usize {
    60
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_rate_limit_base_delay_ms() -> u64 {
    5_000
}

const fn default_max_rate_limit_retries() -> u32 {
    5
}

const fn default_ban_cooldown_secs() -> u64 {
    60
}
