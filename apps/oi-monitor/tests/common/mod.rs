//! Shared fixtures for integration tests: a mock futures API with a fixed
//! server clock and generated klines / open interest history.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use oi_monitor::config::{ExchangeConfig, FetchConfig};
use oi_monitor::fetcher::{MarketDataFetcher, RecordingSleeper};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// 2024-06-30T12:30:00Z
pub const SERVER_NOW_MS: i64 = 1_719_750_600_000;
/// 2019-09-08T00:00:00Z
pub const LISTED_MS: i64 = 1_567_900_800_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;

pub fn server_now() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(SERVER_NOW_MS).unwrap()
}

pub fn at(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap()
}

/// Integer query parameter of a received request.
pub fn query_i64(request: &Request, key: &str) -> Option<i64> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse().ok())
}

/// String query parameter of a received request.
pub fn query_str(request: &Request, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub fn exchange_config(server: &MockServer) -> ExchangeConfig {
    ExchangeConfig {
        base_url: server.uri(),
        api_key: String::new(),
        timeout_secs: 5,
    }
}

/// Default fetch settings without request pacing.
pub fn fetch_config() -> FetchConfig {
    FetchConfig {
        min_request_interval_ms: 0,
        ..FetchConfig::default()
    }
}

pub fn fetcher(
    exchange: &ExchangeConfig,
    fetch: &FetchConfig,
) -> (MarketDataFetcher, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    let fetcher = MarketDataFetcher::new(exchange, fetch, sleeper.clone()).unwrap();
    (fetcher, sleeper)
}

/// Mount the server time and exchange info endpoints.
pub async fn mount_clock(server: &MockServer, onboard_ms: i64) {
    Mock::given(method("GET"))
        .and(path("/fapi/v1/time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "serverTime": SERVER_NOW_MS })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fapi/v1/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbols": [
                { "symbol": "BTCUSDT", "onboardDate": onboard_ms },
                { "symbol": "ETHUSDT", "onboardDate": onboard_ms }
            ]
        })))
        .mount(server)
        .await;
}

fn step_ms(request: &Request) -> i64 {
    let interval = query_str(request, "interval")
        .or_else(|| query_str(request, "period"))
        .unwrap_or_default();
    if interval == "1d" { DAY_MS } else { HOUR_MS }
}

/// Period starts inside the requested `[startTime, endTime]`, capped at `limit`.
pub fn requested_times(request: &Request) -> Vec<i64> {
    let step = step_ms(request);
    let start = query_i64(request, "startTime").unwrap_or(0);
    let end = query_i64(request, "endTime").unwrap_or(SERVER_NOW_MS);
    let limit = query_i64(request, "limit").unwrap_or(500) as usize;

    let first = (start + step - 1).div_euclid(step) * step;
    (0..)
        .map(|i| first + i * step)
        .take_while(|t| *t <= end)
        .take(limit)
        .collect()
}

pub fn kline_row(open_ms: i64, step: i64, close: f64, volume: f64) -> Value {
    json!([
        open_ms,
        format!("{close}"),
        format!("{}", close * 1.01),
        format!("{}", close * 0.99),
        format!("{close}"),
        format!("{volume}"),
        open_ms + step - 1,
        format!("{}", close * volume),
        100,
        "0",
        "0",
        "0"
    ])
}

pub fn oi_row(ts_ms: i64, open_interest: f64) -> Value {
    json!({
        "symbol": "BTCUSDT",
        "sumOpenInterest": format!("{open_interest}"),
        "sumOpenInterestValue": format!("{}", open_interest * 100.0),
        "timestamp": ts_ms
    })
}

/// Klines responder; `values(open_ms)` gives `(close, volume)`.
pub fn klines<F>(values: F) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static
where
    F: Fn(i64) -> (f64, f64) + Send + Sync + 'static,
{
    move |request: &Request| {
        let step = step_ms(request);
        let rows: Vec<Value> = requested_times(request)
            .into_iter()
            .map(|t| {
                let (close, volume) = values(t);
                kline_row(t, step, close, volume)
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(rows)
    }
}

/// Open interest history responder; `value(ts_ms)` gives the open interest.
pub fn open_interest_hist<F>(value: F) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static
where
    F: Fn(i64) -> f64 + Send + Sync + 'static,
{
    move |request: &Request| {
        let rows: Vec<Value> = requested_times(request)
            .into_iter()
            .map(|t| oi_row(t, value(t)))
            .collect();
        ResponseTemplate::new(200).set_body_json(rows)
    }
}

/// Received requests for one path, in arrival order.
pub async fn requests_to(server: &MockServer, request_path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == request_path)
        .collect()
}
