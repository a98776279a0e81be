//! histfetch CLI: download historical bars and look up symbols.
//!
//! Commands:
//! - `intraday`: month-by-month intraday history from the quote API
//! - `klines`: batched candles from the exchange klines API
//! - `search`: keyword symbol lookup on the quote API
//! - `run`: execute a download job described in a TOML file
//!
//! `API_KEY` is read from the environment (or a `.env` file) for quote API
//! commands. Logging goes to stderr; set `RUST_LOG` to adjust verbosity and
//! `HISTFETCH_LOG_FORMAT=json` for JSON lines.

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use histfetch_core::config::{Credentials, JobConfig, ProviderKind};
use histfetch_core::data::{
    download_series, AlphaVantageSource, BinanceKlinesSource, DownloadSummary, FetchOptions,
    HttpTransport, PageOutcome, PagedSeriesFetcher, ReqwestTransport, RetryPolicy, SeriesSource,
    SymbolSearch, SystemClock,
};
use histfetch_core::domain::request::MAX_BATCH_SIZE;
use histfetch_core::domain::{parse_timestamp, BarInterval, PageErrorPolicy, SeriesRequestSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "histfetch",
    about = "histfetch: paged historical price downloader"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every download command.
#[derive(Args)]
struct FetchArgs {
    /// What to do when a page fails: skip or abort. Defaults per command.
    #[arg(long)]
    on_page_error: Option<PageErrorPolicy>,

    /// Retry transient failures (429, 5xx, network) up to this many times.
    #[arg(long, default_value_t = 0)]
    max_retries: u32,

    /// Delay before the first retry, doubled for each further retry.
    #[arg(long, default_value_t = 500)]
    retry_base_ms: u64,

    /// Output directory. Defaults to ./data.
    #[arg(long, default_value = "data")]
    output_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Download intraday bars from the quote API, one calendar month per request.
    Intraday {
        /// Symbol to download (e.g., AAPL).
        #[arg(long)]
        symbol: String,

        /// Number of months to walk back.
        #[arg(long, default_value_t = 24)]
        months: u32,

        /// Bar interval: 1min, 5min, 15min, 30min, 60min.
        #[arg(long, default_value = "1min")]
        interval: BarInterval,

        /// Start the walk at the current (incomplete) month.
        #[arg(long, default_value_t = false)]
        include_current_month: bool,

        /// Seconds between requests. Defaults to 12 (5 calls per minute).
        #[arg(long)]
        delay_secs: Option<u64>,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Download candles from the exchange klines API in fixed-size batches.
    Klines {
        /// Trading pair (e.g., BTCUSDT).
        #[arg(long)]
        symbol: String,

        /// Start time (YYYY-MM-DD HH:MM:SS, UTC).
        #[arg(long)]
        start: String,

        /// End time (YYYY-MM-DD HH:MM:SS, UTC).
        #[arg(long)]
        end: String,

        /// Bar interval: 1m, 5m, 15m, 30m, 1h.
        #[arg(long, default_value = "1m")]
        interval: BarInterval,

        /// Records per request (at most 1000).
        #[arg(long, default_value_t = MAX_BATCH_SIZE)]
        limit: usize,

        /// Milliseconds between requests. Defaults to 200.
        #[arg(long)]
        delay_ms: Option<u64>,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Search the quote API for symbols matching keywords.
    Search {
        /// Keywords (e.g., apple).
        #[arg(required = true)]
        keywords: Vec<String>,
    },
    /// Execute a download job from a TOML file.
    Run {
        /// Path to the job file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already carry API_KEY.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Intraday {
            symbol,
            months,
            interval,
            include_current_month,
            delay_secs,
            fetch,
        } => {
            let mut spec = SeriesRequestSpec::calendar_month(symbol, months).with_interval(interval);
            if include_current_month {
                spec = spec.including_current_month();
            }
            let transport = http_transport()?;
            let source = AlphaVantageSource::new(transport, quote_credentials());
            run_download(
                &source,
                spec,
                &fetch,
                delay_secs.map(Duration::from_secs),
            )
        }
        Commands::Klines {
            symbol,
            start,
            end,
            interval,
            limit,
            delay_ms,
            fetch,
        } => {
            let spec = SeriesRequestSpec::fixed_batch(
                symbol,
                parse_time_arg("--start", &start)?,
                parse_time_arg("--end", &end)?,
                limit,
            )
            .with_interval(interval);
            let source = BinanceKlinesSource::new(http_transport()?);
            run_download(&source, spec, &fetch, delay_ms.map(Duration::from_millis))
        }
        Commands::Search { keywords } => run_search(&keywords.join(" ")),
        Commands::Run { config } => run_job(&config),
    }
}

fn init_tracing() {
    let log_format =
        std::env::var("HISTFETCH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn http_transport() -> Result<Arc<dyn HttpTransport>> {
    Ok(Arc::new(ReqwestTransport::new()?))
}

fn quote_credentials() -> Credentials {
    let credentials = Credentials::from_env();
    if !credentials.has_api_key() {
        warn!("API_KEY is not set; quote API requests will fail");
    }
    credentials
}

fn parse_time_arg(flag: &str, raw: &str) -> Result<NaiveDateTime> {
    match parse_timestamp(raw) {
        Some(ts) => Ok(ts),
        None => bail!("invalid {flag} '{raw}': expected YYYY-MM-DD HH:MM:SS"),
    }
}

fn run_download(
    source: &dyn SeriesSource,
    mut spec: SeriesRequestSpec,
    args: &FetchArgs,
    request_delay: Option<Duration>,
) -> Result<()> {
    if let Some(policy) = args.on_page_error {
        spec = spec.with_page_error_policy(policy);
    }
    let options = FetchOptions {
        retry: RetryPolicy::new(args.max_retries, Duration::from_millis(args.retry_base_ms)),
        request_delay,
        cancel: None,
    };
    download_and_report(source, &spec, options, &args.output_dir)
}

fn run_job(path: &Path) -> Result<()> {
    let job = JobConfig::from_file(path)?;
    let spec = job.to_request_spec()?;
    info!(job = %path.display(), provider = ?job.provider, symbol = %spec.symbol, "loaded job");
    let credentials = match job.provider {
        ProviderKind::AlphaVantage => quote_credentials(),
        ProviderKind::Binance => Credentials::none(),
    };
    let source = job.build_source(http_transport()?, credentials);
    download_and_report(source.as_ref(), &spec, job.fetch_options(), &job.output_dir)
}

fn download_and_report(
    source: &dyn SeriesSource,
    spec: &SeriesRequestSpec,
    options: FetchOptions,
    output_dir: &Path,
) -> Result<()> {
    let fetcher = PagedSeriesFetcher::new(Arc::new(SystemClock)).with_options(options);
    let summary = download_series(&fetcher, source, spec, output_dir)
        .with_context(|| format!("download of {} from {} failed", spec.symbol, source.name()))?;
    print_summary(&summary);
    Ok(())
}

fn run_search(keywords: &str) -> Result<()> {
    let source = AlphaVantageSource::new(http_transport()?, quote_credentials());
    let matches = source
        .search(keywords)
        .with_context(|| format!("symbol search for '{keywords}' failed"))?;

    if matches.is_empty() {
        println!("No matches for '{keywords}'.");
        return Ok(());
    }
    for m in &matches {
        println!("{} - {} ({})", m.symbol, m.name, m.region);
    }
    Ok(())
}

fn print_summary(summary: &DownloadSummary) {
    println!();
    println!("=== Download Result ===");
    println!("Symbol:    {}", summary.symbol);
    println!("Rows:      {}", summary.rows);
    println!(
        "Requests:  {} ({} skipped)",
        summary.requests(),
        summary.skipped()
    );
    for page in &summary.pages {
        if let PageOutcome::Skipped(err) = &page.outcome {
            println!("  SKIPPED {}: {err}", page.label);
        }
    }
    println!("Saved to:  {}", summary.path.display());
}
