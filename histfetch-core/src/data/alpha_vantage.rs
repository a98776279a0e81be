//! Alpha Vantage quote API source.
//!
//! Intraday history is served one calendar month per request via the
//! `month=YYYY-MM` selector, as CSV. The free tier allows 5 calls per minute,
//! so consecutive requests are spaced 12 seconds apart.
//!
//! The API answers errors and rate-limit notices with HTTP 200 and a JSON
//! body, so a page only counts as well-formed when the CSV header marker is
//! present.

use super::http::HttpTransport;
use super::provider::{
    truncate_body, FetchError, PageRequest, RawPage, SeriesSource, SymbolMatch, SymbolSearch,
    ERROR_BODY_LIMIT,
};
use crate::config::Credentials;
use crate::domain::{parse_timestamp, BarInterval, TimeSeriesRow, WindowingMode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Substring every well-formed intraday CSV page contains.
pub const SCHEMA_MARKER: &str = "timestamp";

/// 5 requests per minute.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(12);

/// One CSV line of a TIME_SERIES_INTRADAY response.
#[derive(Debug, Deserialize)]
struct IntradayRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Alpha Vantage intraday and symbol-search client.
pub struct AlphaVantageSource {
    transport: Arc<dyn HttpTransport>,
    credentials: Credentials,
    base_url: String,
    request_delay: Duration,
}

impl AlphaVantageSource {
    pub fn new(transport: Arc<dyn HttpTransport>, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
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

    fn interval_code(interval: BarInterval) -> &'static str {
        interval.label()
    }

    /// Query for one month of intraday bars. The API key is resolved here, so
    /// a missing key surfaces on the first request rather than at construction.
    fn intraday_query(&self, request: &PageRequest<'_>) -> Result<Vec<(&'static str, String)>, FetchError> {
        let api_key = self.credentials.api_key()?;
        Ok(vec![
            ("function", "TIME_SERIES_INTRADAY".to_string()),
            ("symbol", request.symbol.to_string()),
            ("interval", Self::interval_code(request.interval).to_string()),
            ("outputsize", "full".to_string()),
            ("month", request.window.month_label()),
            ("apikey", api_key.to_string()),
            ("datatype", "csv".to_string()),
        ])
    }

    fn search_query(&self, keywords: &str) -> Result<Vec<(&'static str, String)>, FetchError> {
        let api_key = self.credentials.api_key()?;
        Ok(vec![
            ("function", "SYMBOL_SEARCH".to_string()),
            ("keywords", keywords.to_string()),
            ("apikey", api_key.to_string()),
            ("datatype", "csv".to_string()),
        ])
    }
}

/// Parse an intraday CSV page into rows.
pub fn parse_intraday_csv(text: &str) -> Result<Vec<TimeSeriesRow>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<IntradayRecord>().enumerate() {
        let record = record
            .map_err(|e| FetchError::malformed(format!("intraday CSV line {}: {e}", line + 2)))?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
            FetchError::malformed(format!("invalid timestamp: {}", record.timestamp))
        })?;
        rows.push(TimeSeriesRow {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }
    Ok(rows)
}

/// Parse a SYMBOL_SEARCH CSV body into matches.
pub fn parse_search_csv(text: &str) -> Result<Vec<SymbolMatch>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FetchError::malformed(format!("search CSV header: {e}")))?;
    if !headers.iter().any(|h| h == "symbol") {
        return Err(FetchError::malformed(format!(
            "search response has no symbol column: {}",
            truncate_body(text, ERROR_BODY_LIMIT)
        )));
    }

    reader
        .deserialize::<SymbolMatch>()
        .map(|r| r.map_err(|e| FetchError::malformed(format!("search CSV: {e}"))))
        .collect()
}

impl SeriesSource for AlphaVantageSource {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn supports(&self, mode: WindowingMode) -> bool {
        mode == WindowingMode::CalendarMonth
    }

    fn request_delay(&self) -> Duration {
        self.request_delay
    }

    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<RawPage, FetchError> {
        let query = self.intraday_query(request)?;
        debug!(symbol = request.symbol, month = %request.window.month_label(), "alpha_vantage intraday request");

        let resp = self.transport.get(&self.base_url, &query)?;
        if !resp.is_success() {
            return Err(FetchError::http(resp.status, &resp.body));
        }
        if !resp.body.contains(SCHEMA_MARKER) {
            return Err(FetchError::malformed(truncate_body(&resp.body, ERROR_BODY_LIMIT)));
        }
        Ok(RawPage::CsvText(resp.body))
    }

    fn normalize(&self, page: RawPage) -> Result<Vec<TimeSeriesRow>, FetchError> {
        match page {
            RawPage::CsvText(text) => parse_intraday_csv(&text),
            RawPage::JsonArray(_) => Err(FetchError::malformed(
                "alpha_vantage pages are CSV, got a JSON array",
            )),
        }
    }
}

impl SymbolSearch for AlphaVantageSource {
    fn search(&self, keywords: &str) -> Result<Vec<SymbolMatch>, FetchError> {
        let query = self.search_query(keywords)?;
        debug!(keywords, "alpha_vantage symbol search");

        let resp = self.transport.get(&self.base_url, &query)?;
        if !resp.is_success() {
            return Err(FetchError::http(resp.status, &resp.body));
        }
        parse_search_csv(&resp.body)
    }
}
