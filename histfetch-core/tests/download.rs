//! Download orchestration: fetch, then persist to CSV.

use histfetch_core::data::output::read_series_file;
use histfetch_core::data::{download_series, FetchError, ManualClock, PagedSeriesFetcher};
use histfetch_core::domain::{parse_timestamp, BarInterval, SeriesRequestSpec, TimeSeriesRow};
use histfetch_core::testing::{ScriptedSource, SyntheticBarSource};
use std::sync::Arc;

fn row(raw: &str, close: f64) -> TimeSeriesRow {
    TimeSeriesRow::new(parse_timestamp(raw).unwrap(), close, close, close, close, 5.0)
}

#[test]
fn writes_sorted_series_to_named_file() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(parse_timestamp("2024-04-15 10:00:00").unwrap()));
    let fetcher = PagedSeriesFetcher::new(clock);
    let source = ScriptedSource::new([
        Ok(vec![row("2024-03-05 10:01:00", 2.0), row("2024-03-05 10:00:00", 1.0)]),
        Ok(vec![row("2024-02-05 10:00:00", 0.5)]),
    ]);

    let spec = SeriesRequestSpec::calendar_month("AAPL", 2);
    let summary = download_series(&fetcher, &source, &spec, dir.path()).unwrap();

    assert_eq!(summary.rows, 3);
    assert_eq!(summary.requests(), 2);
    assert!(summary.all_succeeded());
    assert_eq!(
        summary.path.file_name().unwrap().to_str().unwrap(),
        "AAPL_1min_2mo_20240415_1000.csv"
    );

    let saved = read_series_file(&summary.path).unwrap();
    let closes: Vec<f64> = saved.iter().map(|r| r.close).collect();
    assert_eq!(closes, vec![0.5, 1.0, 2.0]);
}

#[test]
fn generation_time_reflects_time_spent_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let start = parse_timestamp("2023-06-01 04:00:00").unwrap();
    let end = parse_timestamp("2023-06-01 06:00:00").unwrap();
    let clock = Arc::new(ManualClock::new(parse_timestamp("2025-01-01 12:00:00").unwrap()));
    let fetcher = PagedSeriesFetcher::new(clock.clone());
    let source = SyntheticBarSource::new(start, end, BarInterval::OneMinute);

    let spec = SeriesRequestSpec::fixed_batch("BTCUSDT", start, end, 60);
    let summary = download_series(&fetcher, &source, &spec, &dir.path().join("nested")).unwrap();

    // Two full batches of 60 bring the cursor to `end`, which stops the run.
    assert_eq!(summary.rows, 120);
    assert_eq!(summary.requests(), 2);
    assert_eq!(clock.sleeps().len(), 1);
    assert!(summary.path.exists());
    assert_eq!(
        summary.path.file_name().unwrap().to_str().unwrap(),
        "BTCUSDT_1min_202306010400-202306010600_20250101_1200.csv"
    );
}

#[test]
fn no_data_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = PagedSeriesFetcher::new(Arc::new(ManualClock::new(
        parse_timestamp("2024-04-15 10:00:00").unwrap(),
    )));
    let source = ScriptedSource::new([
        Err(FetchError::http(500, "down")),
        Ok(Vec::new()),
        Err(FetchError::malformed("rate limited")),
    ]);

    let err = download_series(
        &fetcher,
        &source,
        &SeriesRequestSpec::calendar_month("AAPL", 3),
        dir.path(),
    )
    .unwrap_err();

    assert_eq!(
        err,
        FetchError::NoData {
            symbol: "AAPL".into()
        }
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
