//! HTTP client wrapper with pacing and retry logic.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use super::api_types::ApiErrorResponse;
use super::clock::{RateLimiter, Sleeper};
use super::error::FetchError;
use super::retry::{ErrorCategory, RetryPolicy, categorize_status};
use crate::config::ExchangeConfig;
use crate::observability::metrics;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// HTTP client for the futures market data API.
///
/// Every request waits for the rate limiter, then retries according to the
/// [`RetryPolicy`]. Backoff waits go through the injected [`Sleeper`].
#[derive(Debug, Clone)]
pub struct MarketHttpClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    sleeper: Arc<dyn Sleeper>,
}

impl MarketHttpClient {
    /// Create a new HTTP client.
    pub fn new(
        exchange: &ExchangeConfig,
        policy: RetryPolicy,
        min_request_interval: Duration,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(exchange.timeout_secs))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: exchange.base_url.trim_end_matches('/').to_string(),
            api_key: exchange.api_key().map(str::to_string),
            policy,
            limiter: Arc::new(RateLimiter::new(min_request_interval)),
            sleeper,
        })
    }

    /// GET `path` with query parameters and decode the JSON body.
    ///
    /// `endpoint` labels logs and metrics.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.base_url);
        let mut budget = self.policy.budget();

        loop {
            self.limiter.acquire(self.sleeper.as_ref()).await;

            let mut request = self.client.get(&url).query(query);
            if let Some(key) = &self.api_key {
                request = request.header(API_KEY_HEADER, key);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if let Some(delay) = budget.next_transient() {
                        tracing::warn!(
                            error = %e,
                            endpoint,
                            delay_ms = delay.as_millis(),
                            attempt = budget.attempts(),
                            "Network error, retrying"
                        );
                        metrics::record_fetch_request(endpoint, "retry");
                        self.backoff("network", delay).await;
                        continue;
                    }
                    metrics::record_fetch_request(endpoint, "error");
                    return Err(FetchError::MaxRetriesExceeded {
                        attempts: budget.attempts(),
                        last_error: FetchError::Network(e.to_string()).to_string(),
                    });
                }
            };

            let status = response.status();

            if status.is_success() {
                let text = match response.text().await {
                    Ok(text) => text,
                    Err(e) => {
                        if let Some(delay) = budget.next_transient() {
                            tracing::warn!(
                                error = %e,
                                endpoint,
                                delay_ms = delay.as_millis(),
                                attempt = budget.attempts(),
                                "Response body interrupted, retrying"
                            );
                            metrics::record_fetch_request(endpoint, "retry");
                            self.backoff("network", delay).await;
                            continue;
                        }
                        metrics::record_fetch_request(endpoint, "error");
                        return Err(FetchError::MaxRetriesExceeded {
                            attempts: budget.attempts(),
                            last_error: FetchError::Network(e.to_string()).to_string(),
                        });
                    }
                };
                metrics::record_fetch_request(endpoint, "success");
                return serde_json::from_str(&text).map_err(|e| FetchError::JsonParse(e.to_string()));
            }

            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);

            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .map(|err| match err.code {
                    Some(code) => format!("{} (code {code})", err.msg),
                    None => err.msg,
                })
                .unwrap_or(error_body);

            match categorize_status(status.as_u16()) {
                ErrorCategory::RateLimited => {
                    if let Some(delay) = budget.next_rate_limited(retry_after) {
                        tracing::warn!(
                            endpoint,
                            status = status.as_u16(),
                            delay_ms = delay.as_millis(),
                            "Rate limited, retrying"
                        );
                        metrics::record_fetch_request(endpoint, "rate_limited");
                        self.backoff("rate_limited", delay).await;
                        continue;
                    }
                    metrics::record_fetch_request(endpoint, "error");
                    return Err(FetchError::RateLimited {
                        retry_after_secs: retry_after.map_or(60, |d| d.as_secs()),
                    });
                }
                ErrorCategory::Banned => {
                    let cooldown = retry_after.unwrap_or(self.policy.ban_cooldown);
                    metrics::record_fetch_request(endpoint, "banned");
                    if budget.take_ban_retry() {
                        tracing::warn!(
                            endpoint,
                            cooldown_secs = cooldown.as_secs(),
                            "IP temporarily banned, cooling down"
                        );
                        metrics::record_retry("banned", cooldown.as_secs_f64());
                        self.limiter.impose_ban(cooldown);
                        continue;
                    }
                    return Err(FetchError::RateLimited {
                        retry_after_secs: cooldown.as_secs(),
                    });
                }
                ErrorCategory::Retryable => {
                    if let Some(delay) = budget.next_transient() {
                        tracing::warn!(
                            endpoint,
                            status = status.as_u16(),
                            message = %message,
                            delay_ms = delay.as_millis(),
                            attempt = budget.attempts(),
                            "Retryable error, retrying"
                        );
                        metrics::record_fetch_request(endpoint, "retry");
                        self.backoff("server_error", delay).await;
                        continue;
                    }
                    metrics::record_fetch_request(endpoint, "error");
                    return Err(FetchError::MaxRetriesExceeded {
                        attempts: budget.attempts(),
                        last_error: FetchError::Api {
                            status: status.as_u16(),
                            message,
                        }
                        .to_string(),
                    });
                }
                ErrorCategory::NonRetryable => {
                    metrics::record_fetch_request(endpoint, "error");
                    return Err(match status.as_u16() {
                        401 | 403 => FetchError::AuthenticationFailed,
                        code => FetchError::Api {
                            status: code,
                            message,
                        },
                    });
                }
            }
        }
    }

    async fn backoff(&self, trigger: &str, delay: Duration) {
        metrics::record_retry(trigger, delay.as_secs_f64());
        self.sleeper.sleep(delay).await;
    }
}
