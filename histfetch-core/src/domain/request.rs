//! SeriesRequestSpec: the immutable description of one fetch run.

use crate::data::provider::FetchError;
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest batch the exchange klines endpoint will return in one response.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Bar width. Each provider maps it to its own interval code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BarInterval {
    #[default]
    #[serde(rename = "1min", alias = "1m")]
    OneMinute,
    #[serde(rename = "5min", alias = "5m")]
    FiveMinutes,
    #[serde(rename = "15min", alias = "15m")]
    FifteenMinutes,
    #[serde(rename = "30min", alias = "30m")]
    ThirtyMinutes,
    #[serde(rename = "60min", alias = "1h")]
    SixtyMinutes,
}

impl BarInterval {
    pub fn minutes(self) -> i64 {
        match self {
            Self::OneMinute => 1,
            Self::FiveMinutes => 5,
            Self::FifteenMinutes => 15,
            Self::ThirtyMinutes => 30,
            Self::SixtyMinutes => 60,
        }
    }

    /// One bar width: the smallest step between two distinct records.
    pub fn step(self) -> TimeDelta {
        TimeDelta::minutes(self.minutes())
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::FiveMinutes => "5min",
            Self::FifteenMinutes => "15min",
            Self::ThirtyMinutes => "30min",
            Self::SixtyMinutes => "60min",
        }
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BarInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1min" | "1m" => Ok(Self::OneMinute),
            "5min" | "5m" => Ok(Self::FiveMinutes),
            "15min" | "15m" => Ok(Self::FifteenMinutes),
            "30min" | "30m" => Ok(Self::ThirtyMinutes),
            "60min" | "1h" => Ok(Self::SixtyMinutes),
            other => Err(format!(
                "unknown interval '{other}'. Valid: 1min, 5min, 15min, 30min, 60min"
            )),
        }
    }
}

/// What the fetcher does when a single page fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorPolicy {
    /// Log the failure and move on to the next window.
    Skip,
    /// Abandon the run and surface the page error.
    Abort,
}

impl FromStr for PageErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown page error policy '{other}'. Valid: skip, abort")),
        }
    }
}

/// Discriminant of [`Windowing`], used where only the strategy matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowingMode {
    CalendarMonth,
    FixedBatch,
}

/// How the overall span is cut into page requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Windowing {
    /// One request per calendar month, walking backward a fixed number of months.
    CalendarMonth {
        months_back: u32,
        include_current_month: bool,
    },
    /// Batches of up to `batch_size` records, with a cursor moving forward from
    /// `start` until it reaches `end`.
    FixedBatch {
        start: NaiveDateTime,
        end: NaiveDateTime,
        batch_size: usize,
    },
}

impl Windowing {
    pub fn mode(&self) -> WindowingMode {
        match self {
            Self::CalendarMonth { .. } => WindowingMode::CalendarMonth,
            Self::FixedBatch { .. } => WindowingMode::FixedBatch,
        }
    }
}

/// Immutable configuration for one fetch run.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequestSpec {
    pub symbol: String,
    pub interval: BarInterval,
    pub windowing: Windowing,
    /// Overrides the per-mode default (skip for calendar months, abort for batches).
    pub on_page_error: Option<PageErrorPolicy>,
}

impl SeriesRequestSpec {
    /// Calendar-month run ending at the last complete month.
    pub fn calendar_month(symbol: impl Into<String>, months_back: u32) -> Self {
        Self {
            symbol: symbol.into(),
            interval: BarInterval::default(),
            windowing: Windowing::CalendarMonth {
                months_back,
                include_current_month: false,
            },
            on_page_error: None,
        }
    }

    pub fn fixed_batch(
        symbol: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        batch_size: usize,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval: BarInterval::default(),
            windowing: Windowing::FixedBatch {
                start,
                end,
                batch_size,
            },
            on_page_error: None,
        }
    }

    pub fn with_interval(mut self, interval: BarInterval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_page_error_policy(mut self, policy: PageErrorPolicy) -> Self {
        self.on_page_error = Some(policy);
        self
    }

    /// Start the month walk at the current month instead of the previous one.
    /// No effect on batch runs.
    pub fn including_current_month(mut self) -> Self {
        if let Windowing::CalendarMonth {
            include_current_month,
            ..
        } = &mut self.windowing
        {
            *include_current_month = true;
        }
        self
    }

    pub fn mode(&self) -> WindowingMode {
        self.windowing.mode()
    }

    /// The effective page error policy for this run.
    pub fn page_error_policy(&self) -> PageErrorPolicy {
        self.on_page_error.unwrap_or(match self.mode() {
            WindowingMode::CalendarMonth => PageErrorPolicy::Skip,
            WindowingMode::FixedBatch => PageErrorPolicy::Abort,
        })
    }

    /// Requested span, as used in output file names.
    pub fn span_label(&self) -> String {
        match &self.windowing {
            Windowing::CalendarMonth { months_back, .. } => format!("{months_back}mo"),
            Windowing::FixedBatch { start, end, .. } => format!(
                "{}-{}",
                start.format("%Y%m%d%H%M"),
                end.format("%Y%m%d%H%M")
            ),
        }
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        if self.symbol.trim().is_empty() {
            return Err(FetchError::Config("symbol must not be empty".into()));
        }
        match &self.windowing {
            Windowing::CalendarMonth { months_back, .. } => {
                if *months_back == 0 {
                    return Err(FetchError::Config("months_back must be at least 1".into()));
                }
            }
            Windowing::FixedBatch {
                start,
                end,
                batch_size,
            } => {
                if start >= end {
                    return Err(FetchError::Config(format!(
                        "start ({start}) must be before end ({end})"
                    )));
                }
                if *batch_size == 0 || *batch_size > MAX_BATCH_SIZE {
                    return Err(FetchError::Config(format!(
                        "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {batch_size}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_timestamp;

    fn batch_spec(batch_size: usize) -> SeriesRequestSpec {
        SeriesRequestSpec::fixed_batch(
            "BTCUSDT",
            parse_timestamp("2023-06-01 04:00:00").unwrap(),
            parse_timestamp("2023-06-01 05:00:00").unwrap(),
            batch_size,
        )
    }

    #[test]
    fn default_policy_depends_on_mode() {
        let months = SeriesRequestSpec::calendar_month("AAPL", 3);
        assert_eq!(months.page_error_policy(), PageErrorPolicy::Skip);
        assert_eq!(batch_spec(1000).page_error_policy(), PageErrorPolicy::Abort);
    }

    #[test]
    fn explicit_policy_overrides_default() {
        let spec = batch_spec(1000).with_page_error_policy(PageErrorPolicy::Skip);
        assert_eq!(spec.page_error_policy(), PageErrorPolicy::Skip);
    }

    #[test]
    fn including_current_month_only_touches_calendar_runs() {
        let spec = SeriesRequestSpec::calendar_month("AAPL", 2).including_current_month();
        assert_eq!(
            spec.windowing,
            Windowing::CalendarMonth {
                months_back: 2,
                include_current_month: true
            }
        );
        assert_eq!(batch_spec(10).including_current_month(), batch_spec(10));
    }

    #[test]
    fn span_labels() {
        assert_eq!(SeriesRequestSpec::calendar_month("AAPL", 24).span_label(), "24mo");
        assert_eq!(batch_spec(1000).span_label(), "202306010400-202306010500");
    }

    #[test]
    fn validation_rejects_bad_specs() {
        assert!(SeriesRequestSpec::calendar_month("AAPL", 0).validate().is_err());
        assert!(SeriesRequestSpec::calendar_month(" ", 3).validate().is_err());
        assert!(batch_spec(0).validate().is_err());
        assert!(batch_spec(MAX_BATCH_SIZE + 1).validate().is_err());
        assert!(batch_spec(MAX_BATCH_SIZE).validate().is_ok());

        let start = parse_timestamp("2023-06-01 05:00:00").unwrap();
        let inverted = SeriesRequestSpec::fixed_batch("BTCUSDT", start, start, 10);
        assert!(matches!(inverted.validate(), Err(FetchError::Config(_))));
    }

    #[test]
    fn interval_parsing_accepts_both_provider_spellings() {
        assert_eq!("1m".parse::<BarInterval>().unwrap(), BarInterval::OneMinute);
        assert_eq!("60min".parse::<BarInterval>().unwrap(), BarInterval::SixtyMinutes);
        assert_eq!("1H".parse::<BarInterval>().unwrap(), BarInterval::SixtyMinutes);
        assert!("2min".parse::<BarInterval>().is_err());
        assert_eq!(BarInterval::FifteenMinutes.step(), TimeDelta::minutes(15));
    }
}
