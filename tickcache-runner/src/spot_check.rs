//! Random lookups against served data, run after the first refresh.

use crate::orchestrator::Orchestrator;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotSample {
    pub symbol: String,
    pub timestamp: String,
    pub found: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotCheckReport {
    pub samples: Vec<SpotSample>,
    /// Set when there was nothing to sample.
    pub skipped: bool,
}

impl SpotCheckReport {
    pub fn found(&self) -> usize {
        self.samples.iter().filter(|s| s.found).count()
    }

    pub fn missing(&self) -> usize {
        self.samples.len() - self.found()
    }
}

/// Look up `n` random (symbol, timestamp) pairs.
///
/// Symbols are drawn from those with data, timestamps from the union of all
/// their timestamps, so a pair can legitimately miss when one symbol lacks a
/// bar the others have.
pub fn spot_check<R: Rng + ?Sized>(
    orchestrator: &Orchestrator,
    n: usize,
    rng: &mut R,
) -> SpotCheckReport {
    let mut with_data = Vec::new();
    let mut timestamps = BTreeSet::new();
    for symbol in orchestrator.symbols() {
        let data = orchestrator.get_data(symbol);
        if !data.is_empty() {
            timestamps.extend(data.into_keys());
            with_data.push(symbol.clone());
        }
    }

    if with_data.is_empty() || timestamps.is_empty() {
        tracing::warn!("no symbols have data, skipping spot check");
        return SpotCheckReport {
            samples: Vec::new(),
            skipped: true,
        };
    }

    let timestamps: Vec<String> = timestamps.into_iter().collect();
    let mut samples = Vec::with_capacity(n);
    for i in 0..n {
        let (Some(symbol), Some(timestamp)) = (with_data.choose(rng), timestamps.choose(rng)) else {
            break;
        };
        let point = orchestrator.get_data(symbol).get(timestamp).copied();
        match point {
            Some(p) => tracing::info!(
                check = i + 1,
                symbol = %symbol,
                timestamp = %timestamp,
                close = p.close,
                "spot check found data"
            ),
            None => tracing::warn!(
                check = i + 1,
                symbol = %symbol,
                timestamp = %timestamp,
                "spot check found no data"
            ),
        }
        samples.push(SpotSample {
            symbol: symbol.clone(),
            timestamp: timestamp.clone(),
            found: point.is_some(),
        });
    }

    let report = SpotCheckReport {
        samples,
        skipped: false,
    };
    tracing::info!(
        found = report.found(),
        missing = report.missing(),
        "spot check complete"
    );
    report
}
