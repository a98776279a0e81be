//! FetchWindow: the slice of time covered by a single page request.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request-level time slice. `start` is inclusive; whether `end` is inclusive
/// is up to the provider (calendar months are half-open, exchange batches
/// are closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl FetchWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// The calendar month containing `date`, as `[first of month, first of next month)`.
    pub fn calendar_month(date: NaiveDate) -> Option<Self> {
        let first = date.with_day(1)?;
        let next = first.checked_add_months(Months::new(1))?;
        Some(Self {
            start: first.and_hms_opt(0, 0, 0)?,
            end: next.and_hms_opt(0, 0, 0)?,
        })
    }

    /// `YYYY-MM` of the window start, the quote API's month selector.
    pub fn month_label(&self) -> String {
        format!("{:04}-{:02}", self.start.year(), self.start.month())
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts <= self.end
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start, self.end)
    }
}

/// Month windows stepping backward from the month containing `today`.
///
/// Returns exactly `months_back` windows, newest first. When
/// `include_current_month` is false the walk starts one month earlier, so the
/// still-incomplete current month is never requested.
pub fn calendar_month_windows(
    today: NaiveDate,
    months_back: u32,
    include_current_month: bool,
) -> Option<Vec<FetchWindow>> {
    let mut first = today.with_day(1)?;
    if !include_current_month {
        first = first.checked_sub_months(Months::new(1))?;
    }

    (0..months_back)
        .map(|i| {
            first
                .checked_sub_months(Months::new(i))
                .and_then(FetchWindow::calendar_month)
        })
        .collect()
}
