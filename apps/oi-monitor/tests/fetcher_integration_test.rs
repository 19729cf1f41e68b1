//! Fetcher Integration Tests
//!
//! Runs the market data fetcher against a mock futures API:
//! - clock correction, range clamping and the listing boundary
//! - chunked pagination with overlap deduplication
//! - retry on 5xx, 429 and 418 with recorded (not real) backoff
//! - per-chunk failure isolation and the all-chunks-failed error
//! - API key header and malformed row handling

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::unreadable_literal)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use common::{
    DAY_MS, HOUR_MS, LISTED_MS, SERVER_NOW_MS, at, exchange_config, fetch_config, fetcher,
    kline_row, klines, mount_clock, open_interest_hist, query_i64, requested_times, requests_to,
    server_now,
};
use oi_monitor::config::{ExchangeConfig, FetchConfig, RetryConfig};
use oi_monitor::domain::{FetchWindowRequest, Granularity, MetricKind, Symbol};
use oi_monitor::fetcher::{FetchError, MarketHttpClient, RecordingSleeper, RetryPolicy};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn btc() -> Symbol {
    Symbol::new("BTCUSDT")
}

// ============================================
// Clamping and pagination
// ============================================

#[tokio::test]
async fn candles_are_chunked_deduplicated_and_closed() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(klines(|t| (100.0 + (t / HOUR_MS % 7) as f64, 1000.0)))
        .mount(&server)
        .await;

    let config = FetchConfig {
        kline_page_size: 10,
        ..fetch_config()
    };
    let (fetcher, _) = fetcher(&exchange_config(&server), &config);

    let candles = fetcher
        .fetch_candles(
            &btc(),
            Granularity::Hourly,
            server_now() - ChronoDuration::hours(30),
            server_now(),
        )
        .await
        .unwrap();

    // 07:00 on the 29th through 11:00 on the 30th; the 12:00 candle is still open.
    assert_eq!(candles.len(), 29);
    assert!(
        candles
            .windows(2)
            .all(|w| w[1].open_time - w[0].open_time == ChronoDuration::hours(1))
    );
    assert!(candles.iter().all(|c| c.close_time < server_now()));
    assert!(requests_to(&server, "/fapi/v1/klines").await.len() >= 3);
}

#[tokio::test]
async fn open_interest_start_is_clamped_to_lookback() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    Mock::given(method("GET"))
        .and(path("/futures/data/openInterestHist"))
        .respond_with(open_interest_hist(|_| 20_000.0))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&exchange_config(&server), &fetch_config());
    let rows = fetcher
        .fetch_open_interest_history(
            &btc(),
            Granularity::Hourly,
            server_now() - ChronoDuration::days(45),
            server_now(),
        )
        .await
        .unwrap();

    let requests = requests_to(&server, "/futures/data/openInterestHist").await;
    assert_eq!(
        query_i64(&requests[0], "startTime"),
        Some(SERVER_NOW_MS - 30 * DAY_MS)
    );
    // Each call spans at most 24 hours.
    for request in &requests {
        let span = query_i64(request, "endTime").unwrap() - query_i64(request, "startTime").unwrap();
        assert!(span <= 24 * HOUR_MS);
    }
    assert_eq!(rows.len(), 30 * 24);
    assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
async fn future_range_is_empty_without_calls() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&exchange_config(&server), &fetch_config());
    let points = fetcher
        .fetch(&FetchWindowRequest {
            symbol: btc(),
            metric: MetricKind::Price,
            start: server_now() + ChronoDuration::hours(2),
            end: server_now() + ChronoDuration::hours(5),
            granularity: Granularity::Hourly,
        })
        .await
        .unwrap();

    assert!(points.is_empty());
}

#[tokio::test]
async fn start_moves_past_listing_buffer() {
    let server = MockServer::start().await;
    let listed = SERVER_NOW_MS - 5 * DAY_MS;
    mount_clock(&server, listed).await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(klines(|_| (50.0, 10.0)))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&exchange_config(&server), &fetch_config());
    fetcher
        .fetch_candles(
            &btc(),
            Granularity::Daily,
            server_now() - ChronoDuration::days(20),
            server_now(),
        )
        .await
        .unwrap();

    let requests = requests_to(&server, "/fapi/v1/klines").await;
    assert_eq!(query_i64(&requests[0], "startTime"), Some(listed + DAY_MS));
}

#[tokio::test]
async fn fetch_projects_requested_metric() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(klines(|_| (64_000.0, 12.5)))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&exchange_config(&server), &fetch_config());
    let request = FetchWindowRequest::ending_at(
        btc(),
        MetricKind::Volume,
        Granularity::Hourly,
        server_now(),
        ChronoDuration::hours(6),
    );
    let points = fetcher.fetch(&request).await.unwrap();

    assert!(!points.is_empty());
    assert!(points.iter().all(|p| p.metric == MetricKind::Volume && p.value == 12.5));
}

// ============================================
// Retry behavior
// ============================================

#[tokio::test]
async fn server_errors_are_retried_with_backoff() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(klines(|_| (100.0, 1.0)))
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(&exchange_config(&server), &fetch_config());
    let candles = fetcher
        .fetch_candles(
            &btc(),
            Granularity::Hourly,
            server_now() - ChronoDuration::hours(5),
            server_now(),
        )
        .await
        .unwrap();

    assert_eq!(candles.len(), 4);
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn exhausted_retries_make_fetch_unavailable() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"code": -1000, "msg": "internal"})))
        .expect(3)
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&exchange_config(&server), &fetch_config());
    let err = fetcher
        .fetch_candles(
            &btc(),
            Granularity::Hourly,
            server_now() - ChronoDuration::hours(5),
            server_now(),
        )
        .await
        .unwrap_err();

    match err {
        FetchError::Unavailable {
            endpoint,
            chunks,
            last_error,
            ..
        } => {
            assert_eq!(endpoint, "klines");
            assert_eq!(chunks, 1);
            assert!(last_error.contains("internal"));
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_chunk_does_not_sink_the_fetch() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;

    // Chunks: [-25h, -18h], [-19h, -9h], [-10h, now]; the middle one always fails.
    let failing_start = SERVER_NOW_MS - 19 * HOUR_MS;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(move |request: &Request| {
            if query_i64(request, "startTime") == Some(failing_start) {
                return ResponseTemplate::new(502);
            }
            let rows: Vec<_> = requested_times(request)
                .into_iter()
                .map(|t| kline_row(t, HOUR_MS, 10.0, 1.0))
                .collect();
            ResponseTemplate::new(200).set_body_json(rows)
        })
        .mount(&server)
        .await;

    let config = FetchConfig {
        kline_page_size: 10,
        ..fetch_config()
    };
    let (fetcher, _) = fetcher(&exchange_config(&server), &config);
    let candles = fetcher
        .fetch_candles(
            &btc(),
            Granularity::Hourly,
            server_now() - ChronoDuration::hours(25),
            server_now(),
        )
        .await
        .unwrap();

    let gap_start = at(SERVER_NOW_MS - 18 * HOUR_MS);
    let gap_end = at(SERVER_NOW_MS - 10 * HOUR_MS);
    assert!(!candles.is_empty());
    assert!(
        candles
            .iter()
            .all(|c| c.open_time < gap_start || c.open_time > gap_end)
    );
}

/// Serve one response whose body stops short of its `Content-Length`, then
/// a complete server time response on every later connection.
async fn truncated_then_complete_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut served = 0;
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0_u8; 4096];
            let _ = socket.read(&mut buf).await;

            let response = if served == 0 {
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 200\r\n\r\n{\"serverTime\":"
                    .to_string()
            } else {
                let body = json!({ "serverTime": SERVER_NOW_MS }).to_string();
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
            };
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
            served += 1;
        }
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn interrupted_body_is_retried() {
    let base_url = truncated_then_complete_server().await;
    let exchange = ExchangeConfig {
        base_url,
        api_key: String::new(),
        timeout_secs: 5,
    };
    let sleeper = Arc::new(RecordingSleeper::new());
    let client = MarketHttpClient::new(
        &exchange,
        RetryPolicy::from(&RetryConfig::default()),
        Duration::ZERO,
        sleeper.clone(),
    )
    .unwrap();

    let body: serde_json::Value = client
        .get("server_time", "/fapi/v1/time", &[])
        .await
        .unwrap();

    assert_eq!(body["serverTime"], json!(SERVER_NOW_MS));
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(1)]);
}

#[tokio::test]
async fn rate_limit_waits_for_retry_after() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(klines(|_| (1.0, 1.0)))
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(&exchange_config(&server), &fetch_config());
    fetcher
        .fetch_candles(
            &btc(),
            Granularity::Hourly,
            server_now() - ChronoDuration::hours(3),
            server_now(),
        )
        .await
        .unwrap();

    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(7)]);
}

#[tokio::test]
async fn ban_imposes_cooldown_before_next_call() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(ResponseTemplate::new(418))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(klines(|_| (1.0, 1.0)))
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(&exchange_config(&server), &fetch_config());
    fetcher
        .fetch_candles(
            &btc(),
            Granularity::Hourly,
            server_now() - ChronoDuration::hours(3),
            server_now(),
        )
        .await
        .unwrap();

    let sleeps = sleeper.sleeps();
    assert_eq!(sleeps.len(), 1);
    assert!(sleeps[0] > Duration::from_secs(59));
}

#[tokio::test]
async fn persistent_rate_limit_terminates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/openInterest"))
        .respond_with(ResponseTemplate::new(429))
        .expect(6)
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(&exchange_config(&server), &fetch_config());
    let err = fetcher.fetch_snapshot(&btc()).await.unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(sleeper.sleeps().len(), 5);
    assert_eq!(sleeper.sleeps()[0], Duration::from_secs(5));
}

#[tokio::test]
async fn authentication_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/openInterest"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"code": -2015, "msg": "Invalid API-key"})))
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(&exchange_config(&server), &fetch_config());
    let err = fetcher.fetch_snapshot(&btc()).await.unwrap_err();

    assert!(matches!(err, FetchError::AuthenticationFailed));
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn server_time_failure_falls_back_to_local_clock_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/time"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&exchange_config(&server), &fetch_config());
    let before = chrono::Utc::now();
    let first = fetcher.server_now().await;
    let second = fetcher.server_now().await;

    assert!(first >= before);
    assert!(second >= first);
}

// ============================================
// Snapshots and response handling
// ============================================

#[tokio::test]
async fn snapshot_sends_api_key_and_coerces_strings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/openInterest"))
        .and(header("X-MBX-APIKEY", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "openInterest": "10659.509",
            "symbol": "BTCUSDT",
            "time": SERVER_NOW_MS
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/ticker/24hr"))
        .and(header("X-MBX-APIKEY", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "BTCUSDT",
            "priceChangePercent": "-1.250",
            "lastPrice": "61000.10",
            "volume": "183000.5",
            "quoteVolume": "11163000000.0",
            "count": 2_100_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut exchange = exchange_config(&server);
    exchange.api_key = "test-key".to_string();
    let (fetcher, _) = fetcher(&exchange, &fetch_config());
    let snapshot = fetcher.fetch_snapshot(&btc()).await.unwrap();

    assert_eq!(snapshot.open_interest, 10659.509);
    assert_eq!(snapshot.last_price, 61000.10);
    assert_eq!(snapshot.volume, 183000.5);
    assert_eq!(snapshot.trade_count, 2_100_000);
    assert_eq!(snapshot.price_change_percent, -1.25);
    assert_eq!(snapshot.timestamp, server_now());
}

#[tokio::test]
async fn malformed_rows_are_dropped() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    let t0 = SERVER_NOW_MS - 3 * HOUR_MS - 30 * 60 * 1000;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            kline_row(t0, HOUR_MS, 10.0, 1.0),
            [t0 + HOUR_MS, "1", "1", "1", "not-a-number", "1", t0 + 2 * HOUR_MS - 1, "1", 1],
            {"unexpected": "object"},
            kline_row(t0 + 2 * HOUR_MS, HOUR_MS, 12.0, 1.0)
        ])))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&exchange_config(&server), &fetch_config());
    let candles = fetcher
        .fetch_candles(
            &btc(),
            Granularity::Hourly,
            server_now() - ChronoDuration::hours(4),
            server_now(),
        )
        .await
        .unwrap();

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    assert_eq!(closes, vec![10.0, 12.0]);
}

#[tokio::test]
async fn unparseable_body_is_a_chunk_failure() {
    let server = MockServer::start().await;
    mount_clock(&server, LISTED_MS).await;
    Mock::given(method("GET"))
        .and(path("/futures/data/openInterestHist"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(&exchange_config(&server), &fetch_config());
    let err = fetcher
        .fetch_open_interest_history(
            &btc(),
            Granularity::Hourly,
            server_now() - ChronoDuration::hours(6),
            server_now(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Unavailable { endpoint: "open_interest_hist", .. }));
    assert!(sleeper.sleeps().is_empty());
}
