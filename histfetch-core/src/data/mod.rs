//! Data acquisition: sources, paging, assembly, and output.

pub mod alpha_vantage;
pub mod binance;
pub mod canonicalize;
pub mod clock;
pub mod download;
pub mod fetcher;
pub mod http;
pub mod output;
pub mod provider;
pub mod retry;

pub use alpha_vantage::AlphaVantageSource;
pub use binance::BinanceKlinesSource;
pub use canonicalize::canonicalize;
pub use clock::{CancelToken, Clock, ManualClock, SystemClock};
pub use download::{download_series, DownloadSummary};
pub use fetcher::{FetchOptions, PageOutcome, PageReport, PagedSeriesFetcher, SeriesFetch};
pub use http::{HttpResponse, HttpTransport, ReqwestTransport};
pub use output::{output_file_name, read_series_file, write_series_file};
pub use provider::{FetchError, PageRequest, RawPage, SeriesSource, SymbolMatch, SymbolSearch};
pub use retry::RetryPolicy;
