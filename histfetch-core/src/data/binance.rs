//! Binance spot klines source.
//!
//! `GET /api/v3/klines` returns up to `limit` (max 1000) candles starting at
//! `startTime`, as a JSON array of 12-element arrays:
//!
//! `[open_time, open, high, low, close, volume, close_time, quote_asset_volume,
//!   number_of_trades, taker_buy_base, taker_buy_quote, ignore]`
//!
//! Times are epoch milliseconds (UTC); prices and volumes are decimal strings.

use super::http::HttpTransport;
use super::provider::{FetchError, PageRequest, RawPage, SeriesSource};
use crate::domain::request::MAX_BATCH_SIZE;
use crate::domain::{BarInterval, TimeSeriesRow, WindowingMode};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const BASE_URL: &str = "https://api.binance.com/api/v3/klines";

/// Buffer between requests to stay clear of the request-weight limit.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(200);

/// Number of fields in one kline record.
pub const KLINE_FIELDS: usize = 12;

pub struct BinanceKlinesSource {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    request_delay: Duration,
}

impl BinanceKlinesSource {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            base_url: BASE_URL.to_string(),
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn interval_code(interval: BarInterval) -> &'static str {
        match interval {
            BarInterval::OneMinute => "1m",
            BarInterval::FiveMinutes => "5m",
            BarInterval::FifteenMinutes => "15m",
            BarInterval::ThirtyMinutes => "30m",
            BarInterval::SixtyMinutes => "1h",
        }
    }

    fn klines_query(request: &PageRequest<'_>) -> Vec<(&'static str, String)> {
        let limit = request.limit.unwrap_or(MAX_BATCH_SIZE).min(MAX_BATCH_SIZE);
        vec![
            ("symbol", request.symbol.to_string()),
            ("interval", Self::interval_code(request.interval).to_string()),
            ("startTime", epoch_millis(request.window.start).to_string()),
            ("endTime", epoch_millis(request.window.end).to_string()),
            ("limit", limit.to_string()),
        ]
    }
}

pub fn epoch_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

/// Parse one kline record into a row.
pub fn parse_kline(record: &Value) -> Result<TimeSeriesRow, FetchError> {
    let fields = record
        .as_array()
        .ok_or_else(|| FetchError::malformed(format!("kline is not an array: {record}")))?;
    if fields.len() != KLINE_FIELDS {
        return Err(FetchError::malformed(format!(
            "kline has {} fields, expected {KLINE_FIELDS}",
            fields.len()
        )));
    }

    let open_time = fields[0]
        .as_i64()
        .ok_or_else(|| FetchError::malformed(format!("invalid open_time: {}", fields[0])))?;
    let timestamp = DateTime::from_timestamp_millis(open_time)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| FetchError::malformed(format!("open_time out of range: {open_time}")))?;

    Ok(TimeSeriesRow {
        timestamp,
        open: decimal_field(&fields[1], "open")?,
        high: decimal_field(&fields[2], "high")?,
        low: decimal_field(&fields[3], "low")?,
        close: decimal_field(&fields[4], "close")?,
        volume: decimal_field(&fields[5], "volume")?,
    })
}

/// Coerce a decimal string (or plain JSON number) to f64.
fn decimal_field(value: &Value, name: &str) -> Result<f64, FetchError> {
    match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .ok_or_else(|| FetchError::malformed(format!("invalid {name}: {value}")))
}

impl SeriesSource for BinanceKlinesSource {
    fn name(&self) -> &str {
        "binance"
    }

    fn supports(&self, mode: WindowingMode) -> bool {
        mode == WindowingMode::FixedBatch
    }

    fn request_delay(&self) -> Duration {
        self.request_delay
    }

    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<RawPage, FetchError> {
        let query = Self::klines_query(request);
        debug!(symbol = request.symbol, window = %request.window, "binance klines request");

        let resp = self.transport.get(&self.base_url, &query)?;
        if !resp.is_success() {
            return Err(FetchError::http(resp.status, &resp.body));
        }
        let records: Vec<Value> = serde_json::from_str(&resp.body)
            .map_err(|e| FetchError::malformed(format!("klines body is not a JSON array: {e}")))?;
        Ok(RawPage::JsonArray(records))
    }

    fn normalize(&self, page: RawPage) -> Result<Vec<TimeSeriesRow>, FetchError> {
        match page {
            RawPage::JsonArray(records) => records.iter().map(parse_kline).collect(),
            RawPage::CsvText(_) => Err(FetchError::malformed(
                "binance pages are JSON arrays, got CSV text",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_timestamp;
    use serde_json::json;

    fn kline(open_time: i64) -> Value {
        json!([
            open_time,
            "27000.10",
            "27010.00",
            "26990.50",
            "27005.25",
            "12.345",
            open_time + 59_999,
            "333333.3",
            120,
            "6.1",
            "164000.0",
            "0"
        ])
    }

    #[test]
    fn parses_string_decimals() {
        let ts = parse_timestamp("2023-06-01 04:00:00").unwrap();
        let row = parse_kline(&kline(epoch_millis(ts))).unwrap();
        assert_eq!(row.timestamp, ts);
        assert_eq!(row.open, 27000.10);
        assert_eq!(row.close, 27005.25);
        assert_eq!(row.volume, 12.345);
    }

    #[test]
    fn rejects_short_records() {
        let err = parse_kline(&json!([1, "1", "1"])).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn rejects_non_numeric_price() {
        let mut record = kline(0);
        record[2] = json!("n/a");
        assert!(parse_kline(&record).is_err());
    }

    #[test]
    fn query_uses_epoch_millis_and_caps_limit() {
        let start = parse_timestamp("2023-06-01 04:00:00").unwrap();
        let end = parse_timestamp("2023-06-01 05:00:00").unwrap();
        let request = PageRequest {
            symbol: "BTCUSDT",
            interval: BarInterval::OneMinute,
            window: crate::domain::FetchWindow::new(start, end),
            limit: Some(5000),
        };
        let query = BinanceKlinesSource::klines_query(&request);
        let get = |k: &str| {
            query
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("startTime"), "1685592000000");
        assert_eq!(get("endTime"), "1685595600000");
        assert_eq!(get("interval"), "1m");
        assert_eq!(get("limit"), "1000");
    }
}
