//! Download orchestrator: fetch a series and persist it as CSV.

use super::fetcher::{PageReport, PagedSeriesFetcher};
use super::output::{output_file_name, write_series_file};
use super::provider::{FetchError, SeriesSource};
use crate::domain::SeriesRequestSpec;
use std::path::{Path, PathBuf};
use tracing::info;

/// Summary of a completed download.
#[derive(Debug)]
pub struct DownloadSummary {
    pub symbol: String,
    pub path: PathBuf,
    pub rows: usize,
    pub pages: Vec<PageReport>,
}

impl DownloadSummary {
    pub fn requests(&self) -> usize {
        self.pages.len()
    }

    pub fn skipped(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.outcome, super::fetcher::PageOutcome::Skipped(_)))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.skipped() == 0
    }
}

/// Fetch `spec` from `source` and write the result into `output_dir`.
///
/// The file name carries the generation time read from the fetcher's clock.
/// Nothing is written when the run fails, including the `NoData` case.
pub fn download_series(
    fetcher: &PagedSeriesFetcher,
    source: &dyn SeriesSource,
    spec: &SeriesRequestSpec,
    output_dir: &Path,
) -> Result<DownloadSummary, FetchError> {
    let fetched = fetcher.fetch(spec, source)?;

    let path = output_dir.join(output_file_name(spec, fetcher.clock().now()));
    write_series_file(&path, &fetched.rows)?;
    info!(symbol = %spec.symbol, rows = fetched.rows.len(), path = %path.display(), "saved");

    Ok(DownloadSummary {
        symbol: fetched.symbol,
        path,
        rows: fetched.rows.len(),
        pages: fetched.pages,
    })
}
