//! DataPoint: one OHLCV observation for a symbol at one instant.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire and storage format for point timestamps. Lexicographic order equals
/// chronological order, which the store relies on for range queries.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a `"YYYY-MM-DD HH:MM:SS"` timestamp.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
}

/// Format a timestamp at second precision.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Open/high/low/close/volume values of a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Ohlcv {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// True when every price is finite.
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
    }
}

/// A stored observation.
///
/// `(symbol, timestamp)` is the unique key; a later write for the same key
/// replaces the earlier one. `recorded_at` is audit data only and never takes
/// part in retention decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub symbol: String,
    #[serde(with = "timestamp_serde")]
    pub timestamp: NaiveDateTime,
    pub ohlcv: Ohlcv,
    pub recorded_at: DateTime<Utc>,
}

impl DataPoint {
    /// Build a point stamped with the current time. The symbol is uppercased.
    pub fn new(symbol: &str, timestamp: NaiveDateTime, ohlcv: Ohlcv) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            timestamp,
            ohlcv,
            recorded_at: Utc::now(),
        }
    }

    pub fn timestamp_string(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

mod timestamp_serde {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
