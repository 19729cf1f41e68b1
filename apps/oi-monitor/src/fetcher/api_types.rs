//! Upstream response shapes and numeric coercion.
//!
//! The exchange sends most numbers as JSON strings. Rows whose required
//! fields cannot be coerced to finite numbers are dropped by the parsers
//! below; the caller counts and logs the drops.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::window::Timestamped;
use crate::domain::{Candle, from_millis};

/// `GET /fapi/v1/time`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTimeResponse {
    /// Exchange time in epoch milliseconds.
    pub server_time: i64,
}

/// `GET /fapi/v1/exchangeInfo` (only the fields used here).
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    /// Listed symbols.
    #[serde(default)]
    pub symbols: Vec<SymbolInfo>,
}

/// One symbol entry from exchange info.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    /// Symbol name.
    pub symbol: String,
    /// Listing time in epoch milliseconds.
    #[serde(default)]
    pub onboard_date: Option<i64>,
}

/// `GET /fapi/v1/openInterest`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterestResponse {
    /// Open interest (string-encoded number).
    pub open_interest: Value,
    /// Reading time in epoch milliseconds.
    pub time: i64,
}

/// `GET /fapi/v1/ticker/24hr`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24hResponse {
    /// Last traded price.
    pub last_price: Value,
    /// 24h base volume.
    pub volume: Value,
    /// 24h quote volume.
    #[serde(default)]
    pub quote_volume: Value,
    /// 24h trade count.
    #[serde(default)]
    pub count: Option<u64>,
    /// 24h price change percent.
    #[serde(default)]
    pub price_change_percent: Value,
}

/// Error body returned by the exchange on failures.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Exchange error code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Error message.
    #[serde(default)]
    pub msg: String,
}

/// One open interest history row.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenInterestHistRow {
    /// Period start.
    pub timestamp: DateTime<Utc>,
    /// Open interest in contracts.
    pub sum_open_interest: f64,
    /// Open interest notional value.
    pub sum_open_interest_value: Option<f64>,
}

impl Timestamped for OpenInterestHistRow {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for Candle {
    fn timestamp(&self) -> DateTime<Utc> {
        self.open_time
    }
}

/// Coerce a JSON number or numeric string into a finite `f64`.
#[must_use]
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Coerce a JSON integer (or integer string) into `i64`.
#[must_use]
pub fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a kline row:
/// `[openTime, open, high, low, close, volume, closeTime, quoteVolume, trades, ...]`.
#[must_use]
pub fn parse_kline_row(row: &Value) -> Option<Candle> {
    let fields = row.as_array()?;
    if fields.len() < 9 {
        return None;
    }
    Some(Candle {
        open_time: from_millis(coerce_i64(&fields[0])?)?,
        open: coerce_f64(&fields[1])?,
        high: coerce_f64(&fields[2])?,
        low: coerce_f64(&fields[3])?,
        close: coerce_f64(&fields[4])?,
        volume: coerce_f64(&fields[5])?,
        close_time: from_millis(coerce_i64(&fields[6])?)?,
        quote_volume: coerce_f64(&fields[7])?,
        trades: u64::try_from(coerce_i64(&fields[8])?).ok()?,
    })
}

/// Parse an open interest history row:
/// `{"sumOpenInterest": "..", "sumOpenInterestValue": "..", "timestamp": ms}`.
#[must_use]
pub fn parse_open_interest_row(row: &Value) -> Option<OpenInterestHistRow> {
    let obj = row.as_object()?;
    Some(OpenInterestHistRow {
        timestamp: from_millis(coerce_i64(obj.get("timestamp")?)?)?,
        sum_open_interest: coerce_f64(obj.get("sumOpenInterest")?)?,
        sum_open_interest_value: obj.get("sumOpenInterestValue").and_then(coerce_f64),
    })
}

/// Parse every row, returning the valid ones and the number dropped.
pub fn parse_rows<T>(rows: &[Value], parse: impl Fn(&Value) -> Option<T>) -> (Vec<T>, usize) {
    let parsed: Vec<T> = rows.iter().filter_map(parse).collect();
    let dropped = rows.len() - parsed.len();
    (parsed, dropped)
}
