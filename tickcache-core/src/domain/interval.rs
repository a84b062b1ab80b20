//! Request shape enums accepted by the intraday endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spacing between intraday points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1min")]
    Min1,
    #[serde(rename = "5min")]
    Min5,
    #[serde(rename = "15min")]
    Min15,
    #[serde(rename = "30min")]
    Min30,
    #[default]
    #[serde(rename = "60min")]
    Min60,
}

impl Interval {
    pub const ALL: [Interval; 5] = [
        Interval::Min1,
        Interval::Min5,
        Interval::Min15,
        Interval::Min30,
        Interval::Min60,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Min1 => "1min",
            Self::Min5 => "5min",
            Self::Min15 => "15min",
            Self::Min30 => "30min",
            Self::Min60 => "60min",
        }
    }

    /// Name of the JSON object holding the series for this interval.
    pub fn series_key(&self) -> String {
        format!("Time Series ({})", self.as_str())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == needle)
            .ok_or_else(|| {
                format!("unknown interval '{s}' (expected 1min, 5min, 15min, 30min or 60min)")
            })
    }
}

/// How much history one request returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSize {
    /// Latest 100 points.
    Compact,
    #[default]
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown output size '{other}' (expected compact or full)")),
        }
    }
}
