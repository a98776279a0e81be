//! Series CSV output: `timestamp,open,high,low,close,volume`, ascending.

use super::provider::FetchError;
use crate::domain::{parse_timestamp, SeriesRequestSpec, TimeSeriesRow, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

pub const HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

fn output_err(context: &str, e: impl std::fmt::Display) -> FetchError {
    FetchError::Output(format!("{context}: {e}"))
}

/// Write rows as CSV. Floats use Rust's shortest round-trip representation.
pub fn write_series_csv<W: Write>(writer: W, rows: &[TimeSeriesRow]) -> Result<(), FetchError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(HEADER)
        .map_err(|e| output_err("write header", e))?;

    for row in rows {
        wtr.write_record([
            row.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            row.open.to_string(),
            row.high.to_string(),
            row.low.to_string(),
            row.close.to_string(),
            row.volume.to_string(),
        ])
        .map_err(|e| output_err("write row", e))?;
    }

    wtr.flush().map_err(|e| output_err("flush", e))?;
    Ok(())
}

/// Write rows to `path`, creating parent directories as needed.
///
/// Rows go to a `.csv.tmp` sibling first and are renamed into place, so `path`
/// either holds the complete series or does not exist.
pub fn write_series_file(path: &Path, rows: &[TimeSeriesRow]) -> Result<(), FetchError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| output_err(&format!("create {}", parent.display()), e))?;
        }
    }

    let tmp_path = path.with_extension("csv.tmp");
    let written = File::create(&tmp_path)
        .map_err(|e| output_err(&format!("create {}", tmp_path.display()), e))
        .and_then(|file| write_series_csv(BufWriter::new(file), rows))
        .and_then(|()| {
            fs::rename(&tmp_path, path)
                .map_err(|e| output_err(&format!("rename into {}", path.display()), e))
        });

    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}

/// Read a series CSV written by [`write_series_csv`].
pub fn read_series_csv<R: Read>(reader: R) -> Result<Vec<TimeSeriesRow>, FetchError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().map_err(|e| output_err("read header", e))?;
    if headers.iter().ne(HEADER.iter().copied()) {
        return Err(FetchError::Output(format!(
            "unexpected header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| output_err("read row", e))?;
        let line = i + 2;
        let field = |idx: usize| -> Result<f64, FetchError> {
            record
                .get(idx)
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(|| FetchError::Output(format!("line {line}: invalid {}", HEADER[idx])))
        };
        let timestamp = record
            .get(0)
            .and_then(parse_timestamp)
            .ok_or_else(|| FetchError::Output(format!("line {line}: invalid timestamp")))?;
        rows.push(TimeSeriesRow {
            timestamp,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        });
    }
    Ok(rows)
}

pub fn read_series_file(path: &Path) -> Result<Vec<TimeSeriesRow>, FetchError> {
    let file = File::open(path).map_err(|e| output_err(&format!("open {}", path.display()), e))?;
    read_series_csv(file)
}

/// `{SYMBOL}_{interval}_{span}_{generated:%Y%m%d_%H%M}.csv`
pub fn output_file_name(spec: &SeriesRequestSpec, generated_at: NaiveDateTime) -> String {
    format!(
        "{}_{}_{}_{}.csv",
        spec.symbol,
        spec.interval.label(),
        spec.span_label(),
        generated_at.format("%Y%m%d_%H%M")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<TimeSeriesRow> {
        vec![
            TimeSeriesRow::new(
                parse_timestamp("2024-01-02 09:30:00").unwrap(),
                185.1,
                185.5,
                184.9,
                185.25,
                10_500.0,
            ),
            TimeSeriesRow::new(
                parse_timestamp("2024-01-02 09:31:00").unwrap(),
                185.25,
                185.3,
                185.0,
                185.05,
                8_000.0,
            ),
        ]
    }

    #[test]
    fn writes_header_and_rows() {
        let mut buf = Vec::new();
        write_series_csv(&mut buf, &rows()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp,open,high,low,close,volume"));
        assert_eq!(
            lines.next(),
            Some("2024-01-02 09:30:00,185.1,185.5,184.9,185.25,10500")
        );
    }

    #[test]
    fn reads_back_what_it_wrote() {
        let mut buf = Vec::new();
        write_series_csv(&mut buf, &rows()).unwrap();
        assert_eq!(read_series_csv(buf.as_slice()).unwrap(), rows());
    }

    #[test]
    fn rejects_foreign_header() {
        let text = "date,price\n2024-01-02,1\n";
        assert!(matches!(
            read_series_csv(text.as_bytes()),
            Err(FetchError::Output(_))
        ));
    }

    #[test]
    fn file_write_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("AAPL.csv");
        write_series_file(&path, &rows()).unwrap();

        assert_eq!(read_series_file(&path).unwrap(), rows());
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn failed_file_write_leaves_neither_output_nor_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory squatting on the target name makes the final rename fail.
        let path = dir.path().join("AAPL.csv");
        fs::create_dir_all(path.join("occupied")).unwrap();

        let err = write_series_file(&path, &rows()).unwrap_err();
        assert!(matches!(err, FetchError::Output(_)));
        assert!(path.is_dir());
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn file_name_includes_symbol_span_and_generation_time() {
        let spec = SeriesRequestSpec::calendar_month("AAPL", 24);
        let generated = parse_timestamp("2025-06-01 14:07:00").unwrap();
        assert_eq!(
            output_file_name(&spec, generated),
            "AAPL_1min_24mo_20250601_1407.csv"
        );
    }
}
