//! Assembly of accumulated pages into the output series.

use crate::domain::TimeSeriesRow;

/// Sort rows ascending by timestamp and drop duplicate timestamps.
///
/// Among rows sharing a timestamp the one appended last wins, so a window that
/// re-delivers a boundary record overrides the earlier copy.
pub fn canonicalize(mut rows: Vec<TimeSeriesRow>) -> Vec<TimeSeriesRow> {
    // Stable: equal timestamps keep accumulation order.
    rows.sort_by_key(|r| r.timestamp);

    let mut out: Vec<TimeSeriesRow> = Vec::with_capacity(rows.len());
    for row in rows {
        match out.last_mut() {
            Some(prev) if prev.timestamp == row.timestamp => *prev = row,
            _ => out.push(row),
        }
    }
    out
}

/// True when timestamps strictly increase.
pub fn is_canonical(rows: &[TimeSeriesRow]) -> bool {
    rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}
