//! Upstream exchange API configuration.

use serde::{Deserialize, Serialize};

/// Futures market data API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key sent as `X-MBX-APIKEY`. Empty means unauthenticated.
    #[serde(default)]
    pub api_key: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ExchangeConfig {
    /// API key, if one is configured.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty()).then_some(key)
    }
}

fn default_base_url() -> String {
    "https://fapi.binance.com".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}
