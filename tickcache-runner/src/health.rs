//! Health evaluation over a stats snapshot.

use crate::stats::ServiceStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// More failed cycles than this marks the service unhealthy.
pub const MAX_FAILED_UPDATES: u64 = 3;

/// Allowed cache age as a multiple of the refresh interval.
pub const STALENESS_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub reasons: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl ServiceStats {
    /// Judge the snapshot against the tracked symbols and the refresh cadence.
    pub fn health(&self, symbols: &[String], refresh_interval: Duration) -> HealthReport {
        let mut reasons = Vec::new();

        let missing: Vec<&str> = symbols
            .iter()
            .filter(|s| self.store.rows_per_symbol.get(s.as_str()).copied().unwrap_or(0) == 0)
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            reasons.push(format!("Missing data for symbols: {}", missing.join(", ")));
        }

        let max_age_secs = refresh_interval.as_secs_f64() * STALENESS_FACTOR;
        if let Some(age) = self.cache_age_seconds {
            if age as f64 > max_age_secs {
                reasons.push(format!(
                    "Cache is stale: {} minutes old (max allowed: {} minutes)",
                    age / 60,
                    (max_age_secs / 60.0) as u64
                ));
            }
        }

        if self.refresh.failed_update_count > MAX_FAILED_UPDATES {
            reasons.push(format!(
                "Multiple failed cache updates: {}",
                self.refresh.failed_update_count
            ));
        }

        let healthy = reasons.is_empty();
        if healthy {
            reasons.push("All checks passed".to_string());
        } else {
            tracing::warn!(reasons = ?reasons, "health check failed");
        }

        HealthReport {
            healthy,
            reasons,
            checked_at: self.taken_at,
        }
    }
}
