//! Deterministic fakes for tests and offline runs.
//!
//! - [`ScriptedTransport`]: replays canned HTTP responses and records queries.
//! - [`ScriptedSource`]: replays canned pages at the `SeriesSource` level.
//! - [`SyntheticBarSource`]: serves one bar per interval over a fixed span,
//!   honoring window bounds and batch limits like a real exchange.

use crate::data::http::{HttpResponse, HttpTransport};
use crate::data::output::{read_series_csv, write_series_csv};
use crate::data::provider::{FetchError, PageRequest, RawPage, SeriesSource};
use crate::domain::{BarInterval, FetchWindow, TimeSeriesRow, WindowingMode};
use chrono::NaiveDateTime;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Encode rows as a CSV page, the way a CSV provider would send them.
pub fn csv_page(rows: &[TimeSeriesRow]) -> Result<RawPage, FetchError> {
    let mut buf = Vec::new();
    write_series_csv(&mut buf, rows)?;
    String::from_utf8(buf)
        .map(RawPage::CsvText)
        .map_err(|e| FetchError::malformed(e.to_string()))
}

fn decode_csv_page(page: RawPage) -> Result<Vec<TimeSeriesRow>, FetchError> {
    match page {
        RawPage::CsvText(text) => read_series_csv(text.as_bytes()),
        RawPage::JsonArray(_) => Err(FetchError::malformed("expected a CSV page")),
    }
}

/// One request seen by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Replays responses in order. Once the script runs out every request fails
/// with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: impl IntoIterator<Item = Result<HttpResponse, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, FetchError> {
        lock(&self.requests).push(RecordedRequest {
            url: url.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Transport("no scripted response left".into())))
    }
}

/// Replays pages in order for any windowing mode. Once the script runs out
/// every request returns an empty page.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    pages: Mutex<VecDeque<Result<Vec<TimeSeriesRow>, FetchError>>>,
    windows: Mutex<Vec<FetchWindow>>,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(pages: impl IntoIterator<Item = Result<Vec<TimeSeriesRow>, FetchError>>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            windows: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Windows requested so far, in order.
    pub fn windows(&self) -> Vec<FetchWindow> {
        lock(&self.windows).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.windows).len()
    }
}

impl SeriesSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supports(&self, _mode: WindowingMode) -> bool {
        true
    }

    fn request_delay(&self) -> Duration {
        self.delay
    }

    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<RawPage, FetchError> {
        lock(&self.windows).push(request.window);
        let rows = lock(&self.pages).pop_front().unwrap_or_else(|| Ok(Vec::new()))?;
        csv_page(&rows)
    }

    fn normalize(&self, page: RawPage) -> Result<Vec<TimeSeriesRow>, FetchError> {
        decode_csv_page(page)
    }
}

/// Serves bars at `data_start + k * interval` up to `data_end` inclusive.
///
/// Each request returns the bars inside the closed request window, capped at
/// the request limit. Requests whose 0-based index is in the failure set
/// answer HTTP 500.
#[derive(Debug)]
pub struct SyntheticBarSource {
    data_start: NaiveDateTime,
    data_end: NaiveDateTime,
    interval: BarInterval,
    fail_on: HashSet<usize>,
    windows: Mutex<Vec<FetchWindow>>,
}

impl SyntheticBarSource {
    pub fn new(data_start: NaiveDateTime, data_end: NaiveDateTime, interval: BarInterval) -> Self {
        Self {
            data_start,
            data_end,
            interval,
            fail_on: HashSet::new(),
            windows: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, requests: impl IntoIterator<Item = usize>) -> Self {
        self.fail_on = requests.into_iter().collect();
        self
    }

    pub fn windows(&self) -> Vec<FetchWindow> {
        lock(&self.windows).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.windows).len()
    }

    /// Every bar the source holds.
    pub fn all_bars(&self) -> Vec<TimeSeriesRow> {
        self.bars_between(self.data_start, self.data_end, usize::MAX)
    }

    fn bars_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: usize,
    ) -> Vec<TimeSeriesRow> {
        let step = self.interval.step();
        let mut bars = Vec::new();
        let mut ts = self.data_start;
        let mut k = 0u32;
        while ts <= self.data_end && ts <= to && bars.len() < limit {
            if ts >= from {
                let price = 100.0 + f64::from(k % 500) * 0.25;
                bars.push(TimeSeriesRow::new(
                    ts,
                    price,
                    price + 0.5,
                    price - 0.5,
                    price + 0.25,
                    f64::from(1 + k % 97),
                ));
            }
            ts += step;
            k += 1;
        }
        bars
    }
}

impl SeriesSource for SyntheticBarSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn supports(&self, _mode: WindowingMode) -> bool {
        true
    }

    fn request_delay(&self) -> Duration {
        Duration::from_millis(200)
    }

    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<RawPage, FetchError> {
        let index = {
            let mut windows = lock(&self.windows);
            windows.push(request.window);
            windows.len() - 1
        };
        if self.fail_on.contains(&index) {
            return Err(FetchError::http(500, "synthetic failure"));
        }
        let limit = request.limit.unwrap_or(usize::MAX);
        csv_page(&self.bars_between(request.window.start, request.window.end, limit))
    }

    fn normalize(&self, page: RawPage) -> Result<Vec<TimeSeriesRow>, FetchError> {
        decode_csv_page(page)
    }
}
