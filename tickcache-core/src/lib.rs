//! tickcache core: domain types, error taxonomy, upstream client, point store.
//!
//! This crate holds everything below the refresh orchestrator:
//! - Domain types (data points, intervals, symbol normalization)
//! - `ApiError`, the four-kind error taxonomy shared with callers
//! - `IntradaySource` and the Alpha Vantage client with its retry driver
//! - `Store`, the SQLite-backed point store with retention purge
//! - `ServiceConfig`, loaded from TOML and the environment

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod store;

pub use config::{ConfigError, ServiceConfig};
pub use data::{AlphaVantageClient, Connectivity, IntradaySeries, IntradaySource, RawOhlcv};
pub use domain::{DataPoint, Interval, Ohlcv, OutputSize};
pub use error::{ApiError, ApiErrorKind, Details};
pub use store::{Store, StoreError, StoreStats};
