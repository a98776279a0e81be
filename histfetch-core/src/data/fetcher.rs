//! PagedSeriesFetcher: drives windowed page requests for one run.
//!
//! Two windowing strategies:
//! - **Calendar month**: a fixed number of requests, one per month, walking
//!   backward. Never data-driven.
//! - **Fixed batch**: a cursor moving forward from `start`; each page covers up
//!   to `batch_size` bars and the cursor jumps one bar past the last record
//!   received. Stops at `end` or on the first empty page.
//!
//! Requests are strictly sequential with a pause between them. Every run owns
//! its accumulator; the result is sorted and de-duplicated before it is
//! returned.

use super::canonicalize::canonicalize;
use super::clock::{CancelToken, Clock};
use super::provider::{FetchError, PageRequest, SeriesSource};
use super::retry::RetryPolicy;
use crate::domain::{
    calendar_month_windows, BarInterval, FetchWindow, PageErrorPolicy, SeriesRequestSpec,
    TimeSeriesRow, Windowing,
};
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-run knobs that are not part of the request itself.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub retry: RetryPolicy,
    /// Overrides the source's own pause between requests.
    pub request_delay: Option<Duration>,
    /// Checked once per iteration, before each request.
    pub cancel: Option<CancelToken>,
}

/// What happened to one issued page request.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Rows(usize),
    Empty,
    Skipped(FetchError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageReport {
    /// `YYYY-MM` for month pages, the window start for batch pages.
    pub label: String,
    pub window: FetchWindow,
    pub outcome: PageOutcome,
}

/// Result of a successful run: canonical rows plus one report per request.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFetch {
    pub symbol: String,
    pub rows: Vec<TimeSeriesRow>,
    pub pages: Vec<PageReport>,
}

impl SeriesFetch {
    pub fn request_count(&self) -> usize {
        self.pages.len()
    }

    pub fn skipped_pages(&self) -> impl Iterator<Item = &PageReport> {
        self.pages
            .iter()
            .filter(|p| matches!(p.outcome, PageOutcome::Skipped(_)))
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.last().map(|r| r.timestamp)
    }
}

/// Accumulator owned by a single `fetch` call.
#[derive(Default)]
struct RunState {
    rows: Vec<TimeSeriesRow>,
    pages: Vec<PageReport>,
}

impl RunState {
    fn record(&mut self, label: String, window: FetchWindow, rows: Vec<TimeSeriesRow>) {
        let outcome = if rows.is_empty() {
            PageOutcome::Empty
        } else {
            PageOutcome::Rows(rows.len())
        };
        self.rows.extend(rows);
        self.pages.push(PageReport {
            label,
            window,
            outcome,
        });
    }

    fn skip(&mut self, label: String, window: FetchWindow, err: FetchError) {
        self.pages.push(PageReport {
            label,
            window,
            outcome: PageOutcome::Skipped(err),
        });
    }
}

pub struct PagedSeriesFetcher {
    clock: Arc<dyn Clock>,
    options: FetchOptions,
}

impl PagedSeriesFetcher {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            options: FetchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Run every page request described by `spec` against `source`.
    ///
    /// Fails with `NoData` when no page produced a single row.
    pub fn fetch(
        &self,
        spec: &SeriesRequestSpec,
        source: &dyn SeriesSource,
    ) -> Result<SeriesFetch, FetchError> {
        spec.validate()?;
        if !source.supports(spec.mode()) {
            return Err(FetchError::Config(format!(
                "{} does not support {:?} windowing",
                source.name(),
                spec.mode()
            )));
        }

        let policy = spec.page_error_policy();
        let delay = self
            .options
            .request_delay
            .unwrap_or_else(|| source.request_delay());
        let mut state = RunState::default();

        info!(
            provider = source.name(),
            symbol = %spec.symbol,
            mode = ?spec.mode(),
            ?policy,
            "starting fetch"
        );

        match &spec.windowing {
            Windowing::CalendarMonth {
                months_back,
                include_current_month,
            } => self.walk_months(
                spec,
                source,
                *months_back,
                *include_current_month,
                policy,
                delay,
                &mut state,
            )?,
            Windowing::FixedBatch {
                start,
                end,
                batch_size,
            } => self.walk_batches(
                spec,
                source,
                (*start, *end),
                *batch_size,
                policy,
                delay,
                &mut state,
            )?,
        }

        let rows = canonicalize(state.rows);
        if rows.is_empty() {
            warn!(provider = source.name(), symbol = %spec.symbol, requests = state.pages.len(), "no data downloaded");
            return Err(FetchError::NoData {
                symbol: spec.symbol.clone(),
            });
        }

        info!(
            provider = source.name(),
            symbol = %spec.symbol,
            rows = rows.len(),
            requests = state.pages.len(),
            "fetch complete"
        );

        Ok(SeriesFetch {
            symbol: spec.symbol.clone(),
            rows,
            pages: state.pages,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_months(
        &self,
        spec: &SeriesRequestSpec,
        source: &dyn SeriesSource,
        months_back: u32,
        include_current_month: bool,
        policy: PageErrorPolicy,
        delay: Duration,
        state: &mut RunState,
    ) -> Result<(), FetchError> {
        let today = self.clock.now().date();
        let windows = calendar_month_windows(today, months_back, include_current_month)
            .ok_or_else(|| FetchError::Config(format!("cannot step {months_back} months back from {today}")))?;

        for (i, window) in windows.into_iter().enumerate() {
            self.check_cancelled()?;
            if i > 0 {
                self.clock.sleep(delay);
            }

            let label = window.month_label();
            info!(provider = source.name(), symbol = %spec.symbol, month = %label, "downloading month");

            let request = PageRequest {
                symbol: &spec.symbol,
                interval: spec.interval,
                window,
                limit: None,
            };
            match self.request_page(source, &request) {
                Ok(rows) => state.record(label, window, rows),
                Err(e) => {
                    let e = recover(policy, source.name(), &label, e)?;
                    state.skip(label, window, e);
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_batches(
        &self,
        spec: &SeriesRequestSpec,
        source: &dyn SeriesSource,
        (start, end): (NaiveDateTime, NaiveDateTime),
        batch_size: usize,
        policy: PageErrorPolicy,
        delay: Duration,
        state: &mut RunState,
    ) -> Result<(), FetchError> {
        let step = spec.interval.step();
        let span = batch_span(spec.interval, batch_size);
        let mut cursor = start;
        let mut issued = 0usize;

        while cursor < end {
            self.check_cancelled()?;
            if issued > 0 {
                self.clock.sleep(delay);
            }
            issued += 1;

            let window_end = cursor.checked_add_signed(span).map_or(end, |t| t.min(end));
            let window = FetchWindow::new(cursor, window_end);
            let label = cursor.to_string();
            let request = PageRequest {
                symbol: &spec.symbol,
                interval: spec.interval,
                window,
                limit: Some(batch_size),
            };

            match self.request_page(source, &request) {
                Ok(rows) => {
                    let Some(last) = rows.iter().map(|r| r.timestamp).max() else {
                        info!(provider = source.name(), symbol = %spec.symbol, %cursor, "source exhausted");
                        state.record(label, window, rows);
                        break;
                    };
                    info!(provider = source.name(), symbol = %spec.symbol, rows = rows.len(), %last, "batch received");
                    state.record(label, window, rows);
                    match next_cursor(cursor, last, step) {
                        Some(next) => cursor = next,
                        None => break,
                    }
                }
                Err(e) => {
                    let e = recover(policy, source.name(), &label, e)?;
                    state.skip(label, window, e);
                    match next_cursor(cursor, window.end, step) {
                        Some(next) => cursor = next,
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetch and decode one page, retrying transient failures per the policy.
    fn request_page(
        &self,
        source: &dyn SeriesSource,
        request: &PageRequest<'_>,
    ) -> Result<Vec<TimeSeriesRow>, FetchError> {
        let page = self
            .options
            .retry
            .run(self.clock.as_ref(), || source.fetch_page(request))?;
        source.normalize(page)
    }

    fn check_cancelled(&self) -> Result<(), FetchError> {
        match &self.options.cancel {
            Some(token) if token.is_cancelled() => Err(FetchError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Time covered by a full batch.
pub fn batch_span(interval: BarInterval, batch_size: usize) -> chrono::TimeDelta {
    interval.step() * i32::try_from(batch_size).unwrap_or(i32::MAX)
}

/// Cursor after a page whose newest record (or failed window end) is `last`.
///
/// Always strictly after both `last` and the current cursor, so a page is
/// never re-requested and a misbehaving source cannot stall the loop. `None`
/// when the next instant is past the representable calendar, which ends the run.
pub fn next_cursor(
    cursor: NaiveDateTime,
    last: NaiveDateTime,
    step: chrono::TimeDelta,
) -> Option<NaiveDateTime> {
    let past_last = last.checked_add_signed(step)?;
    let past_cursor = cursor.checked_add_signed(step)?;
    Some(past_last.max(past_cursor))
}

/// Decide whether a page error ends the run. Returns the error back when the
/// page may be skipped.
fn recover(
    policy: PageErrorPolicy,
    provider: &str,
    label: &str,
    err: FetchError,
) -> Result<FetchError, FetchError> {
    if policy == PageErrorPolicy::Skip && err.is_page_scoped() {
        warn!(provider, page = label, error = %err, "page failed, skipping");
        Ok(err)
    } else {
        warn!(provider, page = label, error = %err, "page failed, aborting run");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_timestamp;
    use chrono::TimeDelta;

    #[test]
    fn cursor_moves_one_bar_past_last_record() {
        let cursor = parse_timestamp("2023-06-01 04:00:00").unwrap();
        let last = parse_timestamp("2023-06-01 04:59:00").unwrap();
        let next = next_cursor(cursor, last, TimeDelta::minutes(1));
        assert_eq!(next, parse_timestamp("2023-06-01 05:00:00"));
    }

    #[test]
    fn cursor_never_moves_backward() {
        let cursor = parse_timestamp("2023-06-01 04:00:00").unwrap();
        let stale = parse_timestamp("2023-05-01 00:00:00").unwrap();
        let next = next_cursor(cursor, stale, TimeDelta::minutes(1));
        assert_eq!(next, parse_timestamp("2023-06-01 04:01:00"));
    }

    #[test]
    fn cursor_past_calendar_limit_is_none() {
        let last = NaiveDateTime::MAX - TimeDelta::seconds(30);
        assert_eq!(next_cursor(last, last, TimeDelta::minutes(1)), None);
    }

    #[test]
    fn batch_span_scales_with_interval() {
        assert_eq!(batch_span(BarInterval::OneMinute, 1000), TimeDelta::minutes(1000));
        assert_eq!(batch_span(BarInterval::FiveMinutes, 10), TimeDelta::minutes(50));
    }

    #[test]
    fn skip_policy_only_swallows_page_errors() {
        let page = FetchError::http(500, "boom");
        assert!(recover(PageErrorPolicy::Skip, "p", "2024-01", page.clone()).is_ok());
        assert!(recover(PageErrorPolicy::Abort, "p", "2024-01", page).is_err());
        let config = FetchError::Config("no key".into());
        assert!(recover(PageErrorPolicy::Skip, "p", "2024-01", config).is_err());
    }
}
