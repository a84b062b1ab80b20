use super::schema;
use super::{StoreError, StoreStats};
use crate::config::ServiceConfig;
use crate::data::RawOhlcv;
use crate::domain::{format_timestamp, normalize_symbol, parse_timestamp, DataPoint, Ohlcv};
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type DbPool = Pool<SqliteConnectionManager>;

type Conn = PooledConnection<SqliteConnectionManager>;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the point store. Clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
    path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|c| {
            c.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))?;
            c.busy_timeout(BUSY_TIMEOUT)?;
            Ok(())
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        let store = Self {
            pool,
            path: path.to_path_buf(),
        };
        store.try_init_schema()?;
        tracing::info!(path = %path.display(), pool_size, "store opened");
        Ok(store)
    }

    /// Open `{db_dir}/{db_name}` from the configuration.
    pub fn open_default(config: &ServiceConfig) -> Result<Self, StoreError> {
        Self::open(&config.db_path(), config.db_pool_size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<Conn, StoreError> {
        Ok(self.pool.get()?)
    }

    // ── Schema ──

    /// Create the table and indexes if missing. Safe to call repeatedly.
    pub fn init_schema(&self) -> bool {
        match self.try_init_schema() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(path = %self.path.display(), "schema init failed: {e}");
                false
            }
        }
    }

    fn try_init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(&format!(
            "{};\n{};\n{};",
            schema::CREATE_TABLE,
            schema::CREATE_SYMBOL_INDEX,
            schema::CREATE_TIMESTAMP_INDEX
        ))?;
        Ok(())
    }

    // ── Writes ──

    /// Insert or replace one upstream row.
    ///
    /// Returns `false` when the symbol, timestamp or any number is malformed,
    /// or when the write fails. Nothing is written in that case.
    pub fn upsert(&self, symbol: &str, timestamp: &str, raw: &RawOhlcv) -> bool {
        let ts = match parse_timestamp(timestamp) {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!(symbol, timestamp, "rejecting row with bad timestamp: {e}");
                return false;
            }
        };
        let ohlcv = match raw.parse() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(symbol, timestamp, "rejecting malformed row: {e}");
                return false;
            }
        };
        self.upsert_point(&DataPoint::new(symbol, ts, ohlcv))
    }

    /// Insert or replace an already-typed point.
    pub fn upsert_point(&self, point: &DataPoint) -> bool {
        match self.try_upsert(point) {
            Ok(()) => true,
            Err(StoreError::Invalid(msg)) => {
                tracing::warn!(symbol = %point.symbol, "rejecting point: {msg}");
                false
            }
            Err(e) => {
                tracing::error!(
                    symbol = %point.symbol,
                    timestamp = %point.timestamp_string(),
                    "upsert failed: {e}"
                );
                false
            }
        }
    }

    fn try_upsert(&self, point: &DataPoint) -> Result<(), StoreError> {
        let symbol = normalize_symbol(&point.symbol);
        if symbol.is_empty() {
            return Err(StoreError::Invalid("empty symbol".into()));
        }
        if !point.ohlcv.is_finite() {
            return Err(StoreError::Invalid("non-finite price".into()));
        }
        let volume = i64::try_from(point.ohlcv.volume).map_err(|_| {
            StoreError::Invalid(format!("volume {} out of range", point.ohlcv.volume))
        })?;

        let conn = self.conn()?;
        conn.execute(
            schema::UPSERT,
            params![
                symbol,
                point.timestamp_string(),
                point.ohlcv.open,
                point.ohlcv.high,
                point.ohlcv.low,
                point.ohlcv.close,
                volume,
                point.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;
        Ok(())
    }

    // ── Reads ──

    /// Points for `symbol` no older than `window`, keyed by timestamp string.
    pub fn get(&self, symbol: &str, window: ChronoDuration) -> BTreeMap<String, Ohlcv> {
        self.get_since(symbol, cutoff_for(window))
    }

    /// Points for `symbol` with `timestamp >= cutoff`.
    pub fn get_since(&self, symbol: &str, cutoff: NaiveDateTime) -> BTreeMap<String, Ohlcv> {
        let symbol = normalize_symbol(symbol);
        match self.try_get_since(&symbol, cutoff) {
            Ok(points) => points,
            Err(e) => {
                tracing::error!(symbol = %symbol, "read failed: {e}");
                BTreeMap::new()
            }
        }
    }

    fn try_get_since(
        &self,
        symbol: &str,
        cutoff: NaiveDateTime,
    ) -> Result<BTreeMap<String, Ohlcv>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(schema::SELECT_SINCE)?;
        let rows = stmt.query_map(params![symbol, format_timestamp(&cutoff)], |row| {
            let volume: i64 = row.get(5)?;
            Ok((
                row.get::<_, String>(0)?,
                Ohlcv {
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: u64::try_from(volume).unwrap_or(0),
                },
            ))
        })?;

        let mut out = BTreeMap::new();
        for row in rows {
            let (ts, ohlcv) = row?;
            out.insert(ts, ohlcv);
        }
        Ok(out)
    }

    /// Distinct symbols with at least one stored row.
    pub fn list_symbols_with_data(&self) -> BTreeSet<String> {
        match self.try_strings(schema::SELECT_SYMBOLS, None) {
            Ok(symbols) => symbols.into_iter().collect(),
            Err(e) => {
                tracing::error!("listing symbols failed: {e}");
                BTreeSet::new()
            }
        }
    }

    /// Distinct stored timestamps, ascending, optionally for one symbol.
    pub fn available_timestamps(&self, symbol: Option<&str>) -> Vec<String> {
        let result = match symbol {
            Some(sym) => self.try_strings(
                schema::SELECT_TIMESTAMPS_FOR_SYMBOL,
                Some(&normalize_symbol(sym)),
            ),
            None => self.try_strings(schema::SELECT_TIMESTAMPS, None),
        };
        result.unwrap_or_else(|e| {
            tracing::error!(symbol = ?symbol, "listing timestamps failed: {e}");
            Vec::new()
        })
    }

    fn try_strings(&self, sql: &str, arg: Option<&str>) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = match arg {
            Some(a) => stmt
                .query_map(params![a], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    // ── Retention ──

    /// Delete rows older than `window`. Returns the number removed.
    pub fn purge(&self, window: ChronoDuration) -> usize {
        self.purge_before(cutoff_for(window))
    }

    /// Delete rows with `timestamp < cutoff`. A row exactly at the cutoff stays.
    pub fn purge_before(&self, cutoff: NaiveDateTime) -> usize {
        let cutoff = format_timestamp(&cutoff);
        let result = self
            .conn()
            .and_then(|conn| Ok(conn.execute(schema::DELETE_BEFORE, params![cutoff])?));
        match result {
            Ok(n) => {
                if n > 0 {
                    tracing::info!(rows = n, cutoff = %cutoff, "purged expired rows");
                }
                n
            }
            Err(e) => {
                tracing::error!(cutoff = %cutoff, "purge failed: {e}");
                0
            }
        }
    }

    // ── Stats ──

    pub fn stats(&self) -> StoreStats {
        match self.try_stats() {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(path = %self.path.display(), "stats query failed: {e}");
                StoreStats {
                    db_path: self.path.clone(),
                    ..StoreStats::default()
                }
            }
        }
    }

    fn try_stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;

        let total: i64 = conn.query_row(schema::COUNT_ROWS, [], |row| row.get(0))?;

        let mut stmt = conn.prepare(schema::COUNT_BY_SYMBOL)?;
        let rows_per_symbol = stmt
            .query_map([], |row| {
                let n: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, u64::try_from(n).unwrap_or(0)))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let (oldest, newest): (Option<String>, Option<String>) =
            conn.query_row(schema::TIMESTAMP_RANGE, [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        let storage_size_bytes = on_disk_size(&self.path);

        Ok(StoreStats {
            total_rows: u64::try_from(total).unwrap_or(0),
            rows_per_symbol,
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            storage_size_bytes,
            db_path: self.path.clone(),
        })
    }
}

/// Bytes on disk for the database: the main file plus its write-ahead log.
fn on_disk_size(path: &Path) -> u64 {
    let mut wal = path.as_os_str().to_owned();
    wal.push("-wal");
    [path, Path::new(&wal)]
        .iter()
        .filter_map(|p| fs::metadata(p).ok())
        .map(|m| m.len())
        .sum()
}

/// `now - window` in UTC. Windows too large to subtract mean "keep everything".
fn cutoff_for(window: ChronoDuration) -> NaiveDateTime {
    Utc::now()
        .naive_utc()
        .checked_sub_signed(window)
        .unwrap_or(NaiveDateTime::MIN)
}
