//! Source traits, raw page payloads, and structured error types.
//!
//! The SeriesSource trait abstracts over paged providers (quote API, exchange
//! klines) so the fetcher can drive either one and tests can substitute a
//! scripted source.

use crate::domain::{BarInterval, FetchWindow, TimeSeriesRow, WindowingMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Response bodies quoted in errors are cut to this many characters.
pub const ERROR_BODY_LIMIT: usize = 200;

/// Structured error types for fetch operations.
///
/// These are designed to be displayable in CLI output and log lines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network unreachable: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no data returned for '{symbol}'")]
    NoData { symbol: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("fetch cancelled")]
    Cancelled,

    #[error("output error: {0}")]
    Output(String),
}

impl FetchError {
    /// Non-success status with the body truncated for display.
    pub fn http(status: u16, body: &str) -> Self {
        Self::Http {
            status,
            body: truncate_body(body, ERROR_BODY_LIMIT),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedResponse(detail.into())
    }

    /// Errors worth another attempt at the same window: transport failures,
    /// rate limiting, and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Errors scoped to a single page. Only these may be skipped under
    /// [`PageErrorPolicy::Skip`](crate::domain::PageErrorPolicy::Skip).
    pub fn is_page_scoped(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Transport(_) | Self::MalformedResponse(_)
        )
    }
}

/// Cut `body` to at most `max_chars` characters, on a char boundary.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

/// Provider payload before normalization. Discarded once converted to rows.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPage {
    CsvText(String),
    JsonArray(Vec<serde_json::Value>),
}

/// One page request handed to a source.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest<'a> {
    pub symbol: &'a str,
    pub interval: BarInterval,
    pub window: FetchWindow,
    /// Maximum records per page, for batch-windowed sources.
    pub limit: Option<usize>,
}

/// A paged historical data source.
///
/// Implementations only know how to fetch and decode one page. Windowing,
/// pacing, retries, and assembly belong to the fetcher.
pub trait SeriesSource: Send + Sync {
    /// Human-readable name of this source, used in logs.
    fn name(&self) -> &str;

    /// Whether the source can serve windows produced by `mode`.
    fn supports(&self, mode: WindowingMode) -> bool;

    /// Pause the fetcher inserts between consecutive requests.
    fn request_delay(&self) -> Duration;

    /// Issue one request. Non-success statuses and bodies missing the
    /// expected schema are errors.
    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<RawPage, FetchError>;

    /// Convert a raw page into rows, coercing numeric fields.
    fn normalize(&self, page: RawPage) -> Result<Vec<TimeSeriesRow>, FetchError>;
}

/// One match from a symbol-search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub region: String,
    #[serde(rename = "marketOpen", default)]
    pub market_open: String,
    #[serde(rename = "marketClose", default)]
    pub market_close: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "matchScore", default)]
    pub match_score: Option<f64>,
}

/// Keyword lookup against a provider's search endpoint. No pagination.
pub trait SymbolSearch {
    fn search(&self, keywords: &str) -> Result<Vec<SymbolMatch>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_truncates_body() {
        let body = "x".repeat(500);
        match FetchError::http(500, &body) {
            FetchError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), ERROR_BODY_LIMIT);
            }
            other => panic!("expected Http, got {other:?}"),
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_body("héllo", 2), "hé");
        assert_eq!(truncate_body("ok", 10), "ok");
    }

    #[test]
    fn transient_classification() {
        assert!(FetchError::http(429, "").is_transient());
        assert!(FetchError::http(503, "").is_transient());
        assert!(FetchError::Transport("reset".into()).is_transient());
        assert!(!FetchError::http(400, "").is_transient());
        assert!(!FetchError::malformed("no header").is_transient());
        assert!(!FetchError::Config("no key".into()).is_transient());
    }

    #[test]
    fn only_page_errors_are_skippable() {
        assert!(FetchError::http(404, "").is_page_scoped());
        assert!(FetchError::malformed("x").is_page_scoped());
        assert!(!FetchError::Config("no key".into()).is_page_scoped());
        assert!(!FetchError::Cancelled.is_page_scoped());
        assert!(!FetchError::NoData { symbol: "X".into() }.is_page_scoped());
    }
}
