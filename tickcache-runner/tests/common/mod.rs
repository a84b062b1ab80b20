//! Scripted intraday source and fixtures shared by the runner tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tickcache_core::data::{Connectivity, IntradaySeries, IntradaySource, RawOhlcv};
use tickcache_core::{ApiError, Interval, OutputSize, ServiceConfig, Store};
use tickcache_runner::Orchestrator;

/// What the scripted source answers for one symbol.
#[derive(Clone)]
pub enum Reply {
    Series(IntradaySeries),
    Error(ApiError),
    Panic,
}

pub struct ScriptedSource {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Every fetch sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reply(self, symbol: &str, reply: Reply) -> Self {
        self.set(symbol, reply);
        self
    }

    pub fn set(&self, symbol: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(symbol.to_string(), reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IntradaySource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(
        &self,
        symbol: &str,
        _interval: Interval,
        _output_size: OutputSize,
    ) -> Result<IntradaySeries, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let reply = self.replies.lock().unwrap().get(symbol).cloned();
        match reply {
            Some(Reply::Series(series)) => Ok(series),
            Some(Reply::Error(err)) => Err(err),
            Some(Reply::Panic) => panic!("scripted panic for {symbol}"),
            None => Err(ApiError::data_retrieval(format!("no script for {symbol}"))),
        }
    }

    fn probe(&self, symbol: &str) -> Connectivity {
        Connectivity {
            reachable: true,
            message: format!("scripted probe for {symbol}"),
        }
    }
}

pub fn raw(open: &str, high: &str, low: &str, close: &str, volume: &str) -> RawOhlcv {
    RawOhlcv {
        open: open.into(),
        high: high.into(),
        low: low.into(),
        close: close.into(),
        volume: volume.into(),
    }
}

pub fn series(points: &[(&str, RawOhlcv)]) -> IntradaySeries {
    points
        .iter()
        .map(|(ts, v)| (ts.to_string(), v.clone()))
        .collect()
}

pub fn config(symbols: &[&str]) -> ServiceConfig {
    ServiceConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        ..ServiceConfig::default()
    }
}

/// Orchestrator over a fresh temp store. Keep the `TempDir` alive.
pub fn orchestrator(
    cfg: ServiceConfig,
    source: Arc<ScriptedSource>,
) -> (TempDir, Store, Arc<Orchestrator>) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("points.db"), 4).unwrap();
    let orch = Orchestrator::new(cfg, source, store.clone()).unwrap();
    (dir, store, orch)
}
