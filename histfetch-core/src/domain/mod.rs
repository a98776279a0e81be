//! Domain types for historical series fetching.

pub mod request;
pub mod row;
pub mod window;

pub use request::{BarInterval, PageErrorPolicy, SeriesRequestSpec, Windowing, WindowingMode};
pub use row::{parse_timestamp, TimeSeriesRow, TIMESTAMP_FORMAT};
pub use window::{calendar_month_windows, FetchWindow};
