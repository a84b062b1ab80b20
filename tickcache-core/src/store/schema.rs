//! SQL for the `stock_data` table.
//!
//! Timestamps are stored as `"YYYY-MM-DD HH:MM:SS"` text, so plain string
//! comparison in SQL is chronological.

pub const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS stock_data (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol      TEXT    NOT NULL,
        timestamp   TEXT    NOT NULL,
        open        REAL    NOT NULL,
        high        REAL    NOT NULL,
        low         REAL    NOT NULL,
        close       REAL    NOT NULL,
        volume      INTEGER NOT NULL,
        created_at  TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(symbol, timestamp)
    )";

pub const CREATE_SYMBOL_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_stock_data_symbol ON stock_data(symbol)";

pub const CREATE_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_stock_data_timestamp ON stock_data(timestamp)";

/// Last write wins on `(symbol, timestamp)`.
pub const UPSERT: &str = "
    INSERT OR REPLACE INTO stock_data
        (symbol, timestamp, open, high, low, close, volume, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

/// Inclusive lower bound.
pub const SELECT_SINCE: &str = "
    SELECT timestamp, open, high, low, close, volume
    FROM stock_data
    WHERE symbol = ?1 AND timestamp >= ?2
    ORDER BY timestamp ASC";

/// Strict upper bound: a row exactly at the cutoff survives.
pub const DELETE_BEFORE: &str = "DELETE FROM stock_data WHERE timestamp < ?1";

pub const SELECT_SYMBOLS: &str = "SELECT DISTINCT symbol FROM stock_data ORDER BY symbol";

pub const SELECT_TIMESTAMPS: &str =
    "SELECT DISTINCT timestamp FROM stock_data ORDER BY timestamp ASC";

pub const SELECT_TIMESTAMPS_FOR_SYMBOL: &str =
    "SELECT DISTINCT timestamp FROM stock_data WHERE symbol = ?1 ORDER BY timestamp ASC";

pub const COUNT_ROWS: &str = "SELECT COUNT(*) FROM stock_data";

pub const COUNT_BY_SYMBOL: &str =
    "SELECT symbol, COUNT(*) FROM stock_data GROUP BY symbol ORDER BY symbol";

pub const TIMESTAMP_RANGE: &str = "SELECT MIN(timestamp), MAX(timestamp) FROM stock_data";
