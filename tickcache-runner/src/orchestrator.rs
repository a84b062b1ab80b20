//! Refresh orchestrator.
//!
//! Owns the fetch source, the store, a private rayon pool and the refresh
//! statistics. One instance per process, shared by `Arc`.
//!
//! Cycle: `Idle → Dispatching → Collecting → Purging → Idle`. The cycle mutex
//! keeps cycles from overlapping; a second trigger blocks until the first
//! finishes. Reads go straight to the store and only touch the stats mutex.

use crate::background::LoopHandle;
use crate::stats::{RefreshStatistics, ServiceStats};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tickcache_core::domain::{normalize_symbol, normalize_symbols};
use tickcache_core::{
    ApiError, ApiErrorKind, ConfigError, Connectivity, IntradaySource, Ohlcv, ServiceConfig, Store,
};

/// How long dropping the orchestrator waits for the background loop.
pub const DROP_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build fetch thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn background thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Where the current refresh cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    Dispatching,
    Collecting,
    Purging,
}

/// Why a symbol did not refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SymbolFailure {
    Api { error: ApiError },
    Panicked { message: String },
}

/// Result of one symbol's fetch and store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolOutcome {
    pub symbol: String,
    pub rows_written: usize,
    pub rows_rejected: usize,
    pub failure: Option<SymbolFailure>,
}

impl SymbolOutcome {
    fn written(symbol: &str, rows_written: usize, rows_rejected: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            rows_written,
            rows_rejected,
            failure: None,
        }
    }

    fn failed(symbol: &str, failure: SymbolFailure) -> Self {
        Self {
            symbol: symbol.to_string(),
            rows_written: 0,
            rows_rejected: 0,
            failure: Some(failure),
        }
    }

    /// A rate limit alone is a warning: the symbol still counts if it wrote rows.
    pub fn success(&self) -> bool {
        match &self.failure {
            None => true,
            Some(SymbolFailure::Api { error }) if error.is_warning() => self.rows_written > 0,
            Some(_) => false,
        }
    }
}

/// Everything one refresh cycle did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcomes: Vec<SymbolOutcome>,
    pub rows_purged: usize,
}

impl CycleReport {
    /// True only when every symbol refreshed cleanly.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(SymbolOutcome::success)
    }

    pub fn failed_symbols(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.success())
            .map(|o| o.symbol.as_str())
            .collect()
    }

    pub fn rows_written(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows_written).sum()
    }
}

pub struct Orchestrator {
    config: ServiceConfig,
    source: Arc<dyn IntradaySource>,
    store: Store,
    pool: rayon::ThreadPool,
    cycle_lock: Mutex<()>,
    phase: Mutex<CyclePhase>,
    stats: Mutex<RefreshStatistics>,
    pub(crate) background: Mutex<Option<LoopHandle>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("source", &self.source.name())
            .field("store", &self.store)
            .field("symbols", &self.config.symbols)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Orchestrator {
    /// The symbol list is normalized before validation, so rows, lookups and
    /// health all agree on one uppercase, duplicate-free set.
    pub fn new(
        mut config: ServiceConfig,
        source: Arc<dyn IntradaySource>,
        store: Store,
    ) -> Result<Arc<Self>, OrchestratorError> {
        config.symbols = normalize_symbols(&config.symbols);
        config.validate()?;

        let workers = config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tickcache-fetch-{i}"))
            .build()?;

        tracing::info!(
            source = source.name(),
            symbols = ?config.symbols,
            workers,
            "orchestrator ready"
        );

        Ok(Arc::new(Self {
            config,
            source,
            store,
            pool,
            cycle_lock: Mutex::new(()),
            phase: Mutex::new(CyclePhase::Idle),
            stats: Mutex::new(RefreshStatistics::default()),
            background: Mutex::new(None),
        }))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn symbols(&self) -> &[String] {
        &self.config.symbols
    }

    pub fn phase(&self) -> CyclePhase {
        *lock(&self.phase)
    }

    fn set_phase(&self, phase: CyclePhase) {
        *lock(&self.phase) = phase;
    }

    // ── Refresh ──

    /// Run one full cycle: fetch and store every symbol, purge, update stats.
    pub fn refresh_cycle(&self) -> CycleReport {
        let _cycle = lock(&self.cycle_lock);
        let started_at = Utc::now();
        let start = Instant::now();

        self.set_phase(CyclePhase::Dispatching);
        tracing::info!(
            symbols = self.config.symbols.len(),
            workers = self.pool.current_num_threads(),
            "refresh cycle started"
        );

        let outcomes: Vec<SymbolOutcome> = self.pool.install(|| {
            self.config
                .symbols
                .par_iter()
                .map(|symbol| self.refresh_symbol_guarded(symbol))
                .collect()
        });

        self.set_phase(CyclePhase::Collecting);
        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|o| !o.success())
            .map(|o| o.symbol.as_str())
            .collect();
        let rows_written: usize = outcomes.iter().map(|o| o.rows_written).sum();

        self.set_phase(CyclePhase::Purging);
        let rows_purged = self.store.purge(self.config.retention_window());

        lock(&self.stats).record_cycle(!failed.is_empty(), Utc::now());

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if failed.is_empty() {
            tracing::info!(rows_written, rows_purged, elapsed_ms, "refresh cycle complete");
        } else {
            tracing::warn!(
                rows_written,
                rows_purged,
                elapsed_ms,
                failed = ?failed,
                "refresh cycle finished with failures"
            );
        }
        self.set_phase(CyclePhase::Idle);

        CycleReport {
            started_at,
            elapsed_ms,
            outcomes,
            rows_purged,
        }
    }

    /// One cycle; `true` only if every symbol refreshed cleanly.
    pub fn refresh_once(&self) -> bool {
        self.refresh_cycle().success()
    }

    fn refresh_symbol_guarded(&self, symbol: &str) -> SymbolOutcome {
        panic::catch_unwind(AssertUnwindSafe(|| self.refresh_symbol(symbol))).unwrap_or_else(
            |payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(symbol, "refresh task panicked: {message}");
                SymbolOutcome::failed(symbol, SymbolFailure::Panicked { message })
            },
        )
    }

    fn refresh_symbol(&self, symbol: &str) -> SymbolOutcome {
        let series = match self
            .source
            .fetch(symbol, self.config.interval, self.config.output_size)
        {
            Ok(series) => series,
            Err(error) => {
                match error.kind() {
                    ApiErrorKind::RateLimit => {
                        tracing::warn!(symbol, "rate limited, keeping existing data: {error}")
                    }
                    ApiErrorKind::Authentication => tracing::error!(
                        symbol,
                        "authentication failed, check the configured API key: {error}"
                    ),
                    ApiErrorKind::Network | ApiErrorKind::DataRetrieval => {
                        tracing::error!(symbol, "refresh failed: {error}")
                    }
                }
                return SymbolOutcome::failed(symbol, SymbolFailure::Api { error });
            }
        };

        let mut written = 0;
        let mut rejected = 0;
        for (timestamp, raw) in &series {
            if self.store.upsert(symbol, timestamp, raw) {
                written += 1;
            } else {
                rejected += 1;
            }
        }

        if rejected > 0 {
            tracing::warn!(symbol, rows = written, rejected, "symbol refreshed with rejected rows");
        } else {
            tracing::debug!(symbol, rows = written, "symbol refreshed");
        }
        SymbolOutcome::written(symbol, written, rejected)
    }

    // ── Reads ──

    /// Points for `symbol` inside the retention window. Counts a hit when
    /// anything came back, a miss otherwise.
    pub fn get_data(&self, symbol: &str) -> BTreeMap<String, Ohlcv> {
        let symbol = normalize_symbol(symbol);
        let data = self.store.get(&symbol, self.config.retention_window());
        lock(&self.stats).record_lookup(!data.is_empty());
        data
    }

    pub fn list_symbols(&self) -> BTreeSet<String> {
        self.store.list_symbols_with_data()
    }

    pub fn stats(&self) -> ServiceStats {
        let refresh = lock(&self.stats).clone();
        ServiceStats::new(refresh, self.store.stats(), Utc::now())
    }

    /// One upstream request with no retries, for diagnostics.
    pub fn probe(&self, symbol: Option<&str>) -> Connectivity {
        let symbol = symbol
            .map(normalize_symbol)
            .or_else(|| self.config.symbols.first().cloned())
            .unwrap_or_default();
        self.source.probe(&symbol)
    }

    /// Delete rows outside the retention window now, outside any cycle.
    pub fn purge_expired(&self) -> usize {
        let _cycle = lock(&self.cycle_lock);
        self.store.purge(self.config.retention_window())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let running = lock(&self.background).is_some();
        if running {
            self.stop_background_refresh(DROP_STOP_TIMEOUT);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_symbol_counts_only_with_rows() {
        let limited = SymbolFailure::Api {
            error: ApiError::rate_limit("slow down"),
        };
        let mut outcome = SymbolOutcome::failed("AAA", limited);
        assert!(!outcome.success());
        outcome.rows_written = 3;
        assert!(outcome.success());
    }

    #[test]
    fn network_failure_is_never_success() {
        let mut outcome = SymbolOutcome::failed(
            "AAA",
            SymbolFailure::Api {
                error: ApiError::network("down"),
            },
        );
        outcome.rows_written = 3;
        assert!(!outcome.success());
    }

    #[test]
    fn report_lists_failed_symbols() {
        let report = CycleReport {
            started_at: Utc::now(),
            elapsed_ms: 5,
            outcomes: vec![
                SymbolOutcome::written("AAA", 2, 0),
                SymbolOutcome::failed(
                    "BBB",
                    SymbolFailure::Panicked {
                        message: "boom".into(),
                    },
                ),
            ],
            rows_purged: 0,
        };
        assert!(!report.success());
        assert_eq!(report.failed_symbols(), vec!["BBB"]);
        assert_eq!(report.rows_written(), 2);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload = panic::catch_unwind(|| panic!("bad row {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "bad row 7");
    }
}
