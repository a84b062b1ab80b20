//! Domain types: data points, request enums, symbols.

pub mod interval;
pub mod point;
pub mod symbol;

pub use interval::{Interval, OutputSize};
pub use point::{format_timestamp, parse_timestamp, DataPoint, Ohlcv, TIMESTAMP_FORMAT};
pub use symbol::{normalize_symbol, normalize_symbols};
