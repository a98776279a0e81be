//! Credentials and TOML job configuration.

use crate::data::{
    AlphaVantageSource, BinanceKlinesSource, FetchError, FetchOptions, HttpTransport, RetryPolicy,
    SeriesSource,
};
use crate::domain::request::MAX_BATCH_SIZE;
use crate::domain::{parse_timestamp, BarInterval, PageErrorPolicy, SeriesRequestSpec, Windowing};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable holding the quote API key.
pub const API_KEY_ENV: &str = "API_KEY";

/// Provider credentials, passed explicitly into sources that need them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    api_key: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Read `API_KEY` from the process environment. A blank value counts as absent.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV)
                .ok()
                .filter(|k| !k.trim().is_empty()),
        }
    }

    /// The API key, or a configuration error when it was never provided.
    pub fn api_key(&self) -> Result<&str, FetchError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| FetchError::Config(format!("{API_KEY_ENV} is not set")))
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Which provider a job talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    AlphaVantage,
    Binance,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalendarMonthSettings {
    pub months_back: u32,
    #[serde(default)]
    pub include_current_month: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixedBatchSettings {
    pub start: String,
    pub end: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: default_retry_base_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

/// One download job, as read from a TOML file.
///
/// Exactly one of `[calendar_month]` or `[fixed_batch]` must be present, and it
/// must match the provider: the quote API pages by month, the exchange by batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub provider: ProviderKind,
    pub symbol: String,
    #[serde(default)]
    pub interval: BarInterval,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub on_page_error: Option<PageErrorPolicy>,
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry: RetrySettings,
    pub calendar_month: Option<CalendarMonthSettings>,
    pub fixed_batch: Option<FixedBatchSettings>,
}

impl JobConfig {
    /// Load a job from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, FetchError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FetchError::Config(format!("read job file {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a job from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, FetchError> {
        toml::from_str(content).map_err(|e| FetchError::Config(format!("parse job TOML: {e}")))
    }

    /// Build the request spec, checking windowing against the provider.
    pub fn to_request_spec(&self) -> Result<SeriesRequestSpec, FetchError> {
        let windowing = match (self.provider, &self.calendar_month, &self.fixed_batch) {
            (ProviderKind::AlphaVantage, Some(months), None) => Windowing::CalendarMonth {
                months_back: months.months_back,
                include_current_month: months.include_current_month,
            },
            (ProviderKind::Binance, None, Some(batch)) => Windowing::FixedBatch {
                start: parse_job_timestamp("start", &batch.start)?,
                end: parse_job_timestamp("end", &batch.end)?,
                batch_size: batch.batch_size,
            },
            (ProviderKind::AlphaVantage, _, _) => {
                return Err(FetchError::Config(
                    "alpha_vantage jobs need a [calendar_month] section and no [fixed_batch]".into(),
                ))
            }
            (ProviderKind::Binance, _, _) => {
                return Err(FetchError::Config(
                    "binance jobs need a [fixed_batch] section and no [calendar_month]".into(),
                ))
            }
        };

        let spec = SeriesRequestSpec {
            symbol: self.symbol.clone(),
            interval: self.interval,
            windowing,
            on_page_error: self.on_page_error,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            retry: RetryPolicy::new(
                self.retry.max_retries,
                Duration::from_millis(self.retry.base_delay_ms),
            ),
            request_delay: self.request_delay_ms.map(Duration::from_millis),
            cancel: None,
        }
    }

    /// Instantiate the configured provider on top of `transport`.
    pub fn build_source(
        &self,
        transport: Arc<dyn HttpTransport>,
        credentials: Credentials,
    ) -> Box<dyn SeriesSource> {
        match self.provider {
            ProviderKind::AlphaVantage => Box::new(AlphaVantageSource::new(transport, credentials)),
            ProviderKind::Binance => Box::new(BinanceKlinesSource::new(transport)),
        }
    }
}

fn parse_job_timestamp(field: &str, raw: &str) -> Result<chrono::NaiveDateTime, FetchError> {
    parse_timestamp(raw)
        .ok_or_else(|| FetchError::Config(format!("invalid {field} timestamp '{raw}'")))
}
