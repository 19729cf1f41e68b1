//! Fetcher error types.

use thiserror::Error;

/// Errors from the market data fetcher.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Request could not be built or the client could not be created.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream returned a non-retryable error response.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// API key rejected (401/403).
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Rate limited or banned, and the rate-limit retry budget is spent.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until retry is allowed.
        retry_after_secs: u64,
    },

    /// Network error (timeout, connection reset, DNS).
    #[error("Network error: {0}")]
    Network(String),

    /// Response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Response parsed but a required field was missing or not numeric.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Transient retries exhausted.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// The last failure seen.
        last_error: String,
    },

    /// Every chunk of a paginated fetch failed.
    #[error("{endpoint} unavailable for {symbol}: all {chunks} chunks failed ({last_error})")]
    Unavailable {
        /// Instrument.
        symbol: String,
        /// Endpoint label.
        endpoint: &'static str,
        /// Number of chunks attempted.
        chunks: usize,
        /// The last chunk error.
        last_error: String,
    },
}

impl FetchError {
    /// Whether the failure came from the exchange throttling us.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_display_names_endpoint_and_symbol() {
        let err = FetchError::Unavailable {
            symbol: "BTCUSDT".to_string(),
            endpoint: "klines",
            chunks: 3,
            last_error: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "klines unavailable for BTCUSDT: all 3 chunks failed (timeout)"
        );
    }

    #[test]
    fn rate_limited_predicate() {
        assert!(FetchError::RateLimited { retry_after_secs: 60 }.is_rate_limited());
        assert!(!FetchError::AuthenticationFailed.is_rate_limited());
    }
}
