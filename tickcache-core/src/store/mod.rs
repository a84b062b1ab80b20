//! Persistent point store.
//!
//! SQLite file behind an r2d2 pool, WAL journal. Every public operation
//! catches its own storage errors, logs them and degrades to `false`, an empty
//! collection or zero, so callers never see a storage failure.

pub mod schema;
pub mod sqlite;

pub use sqlite::{DbPool, Store};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Internal storage failure. Never leaves the store's public surface.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid value: {0}")]
    Invalid(String),
}

/// Summary of what the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_rows: u64,
    pub rows_per_symbol: BTreeMap<String, u64>,
    pub oldest_timestamp: Option<String>,
    pub newest_timestamp: Option<String>,
    pub storage_size_bytes: u64,
    pub db_path: PathBuf,
}
