//! Market data fetcher.
//!
//! Pulls candles, open interest history and live snapshots from the futures
//! REST API. Every fetch:
//!
//! 1. corrects the local clock against the exchange clock (cached offset)
//! 2. clamps the requested range to what the endpoint serves
//! 3. splits the range into overlapping chunks and fetches them in order
//! 4. merges the chunks by timestamp
//!
//! A chunk that exhausts its retries is skipped; the fetch fails with
//! [`FetchError::Unavailable`] only when every chunk failed.

pub mod api_types;
mod client;
mod clock;
mod error;
mod retry;
mod window;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;

pub use client::MarketHttpClient;
pub use clock::{RateLimiter, RecordingSleeper, ServerClock, Sleeper, TokioSleeper};
pub use error::FetchError;
pub use retry::{ErrorCategory, RetryBudget, RetryPolicy, categorize_status, is_retryable_status};
pub use window::{
    ClampedWindow, EndpointLimits, Timestamped, clamp_window, merge_by_timestamp, plan_chunks,
};

use self::api_types::{
    ExchangeInfoResponse, OpenInterestHistRow, OpenInterestResponse, ServerTimeResponse,
    Ticker24hResponse, coerce_f64, parse_kline_row, parse_open_interest_row, parse_rows,
};
use crate::config::{ExchangeConfig, FetchConfig};
use crate::domain::{
    Candle, FetchWindowRequest, Granularity, MarketSnapshot, MetricKind, Symbol, TimePoint,
    from_millis,
};
use crate::observability::metrics;

const KLINES_PATH: &str = "/fapi/v1/klines";
const OPEN_INTEREST_HIST_PATH: &str = "/futures/data/openInterestHist";
const OPEN_INTEREST_PATH: &str = "/fapi/v1/openInterest";
const TICKER_24H_PATH: &str = "/fapi/v1/ticker/24hr";
const SERVER_TIME_PATH: &str = "/fapi/v1/time";
const EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";

/// One paginated endpoint.
#[derive(Debug, Clone, Copy)]
struct PagedEndpoint {
    label: &'static str,
    path: &'static str,
    /// Query parameter carrying the granularity.
    period_param: &'static str,
    limits: EndpointLimits,
}

/// Fetches market data for the collector.
#[derive(Debug)]
pub struct MarketDataFetcher {
    http: MarketHttpClient,
    clock: ServerClock,
    listings: Mutex<Option<HashMap<String, DateTime<Utc>>>>,
    klines: PagedEndpoint,
    open_interest_hist: PagedEndpoint,
    listing_buffer: Duration,
    max_chunks: usize,
}

impl MarketDataFetcher {
    /// Create a fetcher.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        exchange: &ExchangeConfig,
        fetch: &FetchConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, FetchError> {
        let http = MarketHttpClient::new(
            exchange,
            RetryPolicy::from(&fetch.retry),
            StdDuration::from_millis(fetch.min_request_interval_ms),
            sleeper,
        )?;

        Ok(Self {
            http,
            clock: ServerClock::new(StdDuration::from_secs(fetch.server_time_ttl_secs)),
            listings: Mutex::new(None),
            klines: PagedEndpoint {
                label: "klines",
                path: KLINES_PATH,
                period_param: "interval",
                limits: EndpointLimits {
                    page_size: fetch.kline_page_size,
                    max_span: None,
                    lookback: Duration::days(fetch.candle_lookback_days),
                },
            },
            open_interest_hist: PagedEndpoint {
                label: "open_interest_hist",
                path: OPEN_INTEREST_HIST_PATH,
                period_param: "period",
                limits: EndpointLimits {
                    page_size: fetch.open_interest_page_size,
                    max_span: Some(Duration::hours(fetch.open_interest_max_span_hours)),
                    lookback: Duration::days(fetch.open_interest_lookback_days),
                },
            },
            listing_buffer: Duration::days(fetch.listing_buffer_days),
            max_chunks: fetch.max_chunks.max(1),
        })
    }

    /// Current exchange time.
    ///
    /// Uses the cached offset while fresh. When the time endpoint fails the
    /// local clock is used and a zero offset is cached for the TTL.
    pub async fn server_now(&self) -> DateTime<Utc> {
        let local = Utc::now();
        if let Some(offset) = self.clock.fresh_offset() {
            return ServerClock::apply(offset, local);
        }

        match self
            .http
            .get::<ServerTimeResponse>("server_time", SERVER_TIME_PATH, &[])
            .await
        {
            Ok(resp) => {
                if let Some(server) = from_millis(resp.server_time) {
                    let offset_ms = self.clock.record(server, Utc::now());
                    tracing::debug!(offset_ms, "Server clock offset refreshed");
                    return server;
                }
                tracing::warn!(
                    server_time = resp.server_time,
                    "Server time out of range, using local clock"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Server time unavailable, using local clock");
            }
        }
        self.clock.record(local, local);
        local
    }

    /// Listing time of `symbol`, if the exchange reports one.
    ///
    /// Exchange info is fetched once per process. A failed lookup is cached
    /// as empty, which skips the listing check.
    pub async fn listing_date(&self, symbol: &Symbol) -> Option<DateTime<Utc>> {
        let cached = self
            .listings
            .lock()
            .as_ref()
            .map(|listings| listings.get(symbol.as_str()).copied());
        if let Some(listed) = cached {
            return listed;
        }

        let listings: HashMap<String, DateTime<Utc>> = match self
            .http
            .get::<ExchangeInfoResponse>("exchange_info", EXCHANGE_INFO_PATH, &[])
            .await
        {
            Ok(info) => info
                .symbols
                .into_iter()
                .filter_map(|s| Some((s.symbol, from_millis(s.onboard_date?)?)))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Exchange info unavailable, skipping listing check");
                HashMap::new()
            }
        };

        let listed = listings.get(symbol.as_str()).copied();
        *self.listings.lock() = Some(listings);
        listed
    }

    /// Fetch one series.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Unavailable`] if every chunk failed.
    pub async fn fetch(&self, request: &FetchWindowRequest) -> Result<Vec<TimePoint>, FetchError> {
        let FetchWindowRequest {
            symbol,
            metric,
            start,
            end,
            granularity,
        } = request;

        let points = match metric {
            MetricKind::Price | MetricKind::Volume => self
                .fetch_candles(symbol, *granularity, *start, *end)
                .await?
                .into_iter()
                .flat_map(|c| c.to_points(symbol, *granularity))
                .filter(|p| p.metric == *metric)
                .collect(),
            MetricKind::OpenInterest => open_interest_points(
                symbol,
                *granularity,
                &self
                    .fetch_open_interest_history(symbol, *granularity, *start, *end)
                    .await?,
            ),
        };
        Ok(points)
    }

    /// Fetch closed candles in `[start, end]`.
    ///
    /// The still-open current period is left out.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Unavailable`] if every chunk failed.
    pub async fn fetch_candles(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, FetchError> {
        let now = self.server_now().await;
        let mut candles = self
            .fetch_paged(
                &self.klines,
                symbol,
                granularity,
                start,
                end,
                now,
                parse_kline_row,
            )
            .await?;
        candles.retain(|c| c.is_closed_at(now));
        Ok(candles)
    }

    /// Fetch open interest history in `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Unavailable`] if every chunk failed.
    pub async fn fetch_open_interest_history(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OpenInterestHistRow>, FetchError> {
        let now = self.server_now().await;
        self.fetch_paged(
            &self.open_interest_hist,
            symbol,
            granularity,
            start,
            end,
            now,
            parse_open_interest_row,
        )
        .await
    }

    /// Current open interest plus the rolling 24h ticker.
    ///
    /// # Errors
    ///
    /// Returns error if either call fails or a required field is not numeric.
    pub async fn fetch_snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot, FetchError> {
        let query = [("symbol", symbol.to_string())];

        let oi: OpenInterestResponse = self
            .http
            .get("open_interest", OPEN_INTEREST_PATH, &query)
            .await?;
        let ticker: Ticker24hResponse = self
            .http
            .get("ticker_24hr", TICKER_24H_PATH, &query)
            .await?;

        let required = |value: &Value, field: &str| {
            coerce_f64(value).ok_or_else(|| {
                FetchError::Malformed(format!("{field} is not numeric for {symbol}: {value}"))
            })
        };

        Ok(MarketSnapshot {
            symbol: symbol.clone(),
            timestamp: from_millis(oi.time).ok_or_else(|| {
                FetchError::Malformed(format!("open interest time out of range: {}", oi.time))
            })?,
            open_interest: required(&oi.open_interest, "openInterest")?,
            last_price: required(&ticker.last_price, "lastPrice")?,
            volume: required(&ticker.volume, "volume")?,
            quote_volume: coerce_f64(&ticker.quote_volume).unwrap_or_default(),
            trade_count: ticker.count.unwrap_or_default(),
            price_change_percent: coerce_f64(&ticker.price_change_percent).unwrap_or_default(),
        })
    }

    /// Clamp, chunk, fetch and merge one paginated endpoint.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_paged<T: Timestamped>(
        &self,
        endpoint: &PagedEndpoint,
        symbol: &Symbol,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
        parse: fn(&Value) -> Option<T>,
    ) -> Result<Vec<T>, FetchError> {
        let listed_after = self
            .listing_date(symbol)
            .await
            .map(|listed| listed + self.listing_buffer);

        let Some(window) = clamp_window(start, end, now, endpoint.limits.lookback, listed_after)
        else {
            tracing::debug!(
                %symbol,
                endpoint = endpoint.label,
                %start,
                %end,
                "Empty fetch window after clamping"
            );
            return Ok(Vec::new());
        };

        let chunks = plan_chunks(window, granularity, &endpoint.limits, self.max_chunks);
        let mut rows = Vec::new();
        let mut last_error = None;
        let mut fetched = 0usize;

        for chunk in &chunks {
            let query = [
                ("symbol", symbol.to_string()),
                (endpoint.period_param, granularity.interval().to_string()),
                ("startTime", chunk.start.timestamp_millis().to_string()),
                ("endTime", chunk.end.timestamp_millis().to_string()),
                ("limit", endpoint.limits.page_size.to_string()),
            ];

            match self
                .http
                .get::<Vec<Value>>(endpoint.label, endpoint.path, &query)
                .await
            {
                Ok(raw) => {
                    let (parsed, dropped) = parse_rows(&raw, parse);
                    if dropped > 0 {
                        tracing::debug!(
                            %symbol,
                            endpoint = endpoint.label,
                            dropped,
                            "Dropped malformed rows"
                        );
                        metrics::record_rows_dropped(endpoint.label, dropped);
                    }
                    rows.extend(parsed);
                    fetched += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        %symbol,
                        endpoint = endpoint.label,
                        chunk_start = %chunk.start,
                        chunk_end = %chunk.end,
                        error = %e,
                        "Chunk unavailable, continuing"
                    );
                    metrics::record_chunk_unavailable(endpoint.label);
                    last_error = Some(e);
                }
            }
        }

        if fetched == 0 {
            if let Some(e) = last_error {
                return Err(FetchError::Unavailable {
                    symbol: symbol.to_string(),
                    endpoint: endpoint.label,
                    chunks: chunks.len(),
                    last_error: e.to_string(),
                });
            }
        }

        let merged = merge_by_timestamp(rows, window);
        tracing::debug!(
            %symbol,
            endpoint = endpoint.label,
            granularity = granularity.as_str(),
            chunks = chunks.len(),
            rows = merged.len(),
            "Fetched series"
        );
        Ok(merged)
    }
}

/// Project open interest history rows into time points.
#[must_use]
pub fn open_interest_points(
    symbol: &Symbol,
    granularity: Granularity,
    rows: &[OpenInterestHistRow],
) -> Vec<TimePoint> {
    rows.iter()
        .map(|row| {
            TimePoint::new(
                symbol.clone(),
                MetricKind::OpenInterest,
                granularity,
                row.timestamp,
                row.sum_open_interest,
            )
        })
        .collect()
}
