//! Intraday source trait and the raw upstream payload types.
//!
//! The `IntradaySource` trait abstracts over where points come from so the
//! orchestrator can run against the real Alpha Vantage client or a scripted
//! mock in tests.

use crate::domain::{Interval, Ohlcv, OutputSize};
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One upstream observation, exactly as the API sends it (numbers as strings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOhlcv {
    #[serde(rename = "1. open")]
    pub open: String,
    #[serde(rename = "2. high")]
    pub high: String,
    #[serde(rename = "3. low")]
    pub low: String,
    #[serde(rename = "4. close")]
    pub close: String,
    #[serde(rename = "5. volume")]
    pub volume: String,
}

impl RawOhlcv {
    /// Parse the string fields. Fails on the first malformed field.
    pub fn parse(&self) -> Result<Ohlcv, String> {
        fn price(name: &str, raw: &str) -> Result<f64, String> {
            let v: f64 = raw
                .trim()
                .parse()
                .map_err(|e| format!("invalid {name} '{raw}': {e}"))?;
            if !v.is_finite() {
                return Err(format!("non-finite {name} '{raw}'"));
            }
            Ok(v)
        }

        let volume = self
            .volume
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid volume '{}': {e}", self.volume))?;

        Ok(Ohlcv {
            open: price("open", &self.open)?,
            high: price("high", &self.high)?,
            low: price("low", &self.low)?,
            close: price("close", &self.close)?,
            volume,
        })
    }
}

impl From<&Ohlcv> for RawOhlcv {
    fn from(v: &Ohlcv) -> Self {
        Self {
            open: v.open.to_string(),
            high: v.high.to_string(),
            low: v.low.to_string(),
            close: v.close.to_string(),
            volume: v.volume.to_string(),
        }
    }
}

/// Upstream series keyed by `"YYYY-MM-DD HH:MM:SS"` timestamp strings.
pub type IntradaySeries = BTreeMap<String, RawOhlcv>;

/// Outcome of a single connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    pub reachable: bool,
    pub message: String,
}

/// A source of intraday points.
///
/// Implementations own retries and classification; they return a typed
/// [`ApiError`] and never mutate caller-visible state on failure.
pub trait IntradaySource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the intraday series for one symbol.
    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        output_size: OutputSize,
    ) -> Result<IntradaySeries, ApiError>;

    /// One lightweight request with no retries, for health reporting.
    fn probe(&self, symbol: &str) -> Connectivity;
}
