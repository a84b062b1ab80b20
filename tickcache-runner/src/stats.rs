//! Refresh statistics and the merged service snapshot.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tickcache_core::StoreStats;

/// Counters owned by one orchestrator. In memory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStatistics {
    pub update_count: u64,
    pub failed_update_count: u64,
    pub cache_hit_count: u64,
    pub cache_miss_count: u64,
    pub last_update_at: Option<DateTime<Utc>>,
}

impl RefreshStatistics {
    /// Share of lookups that returned data, in percent, rounded to two places.
    /// Zero when nothing has been looked up yet.
    pub fn hit_rate_percentage(&self) -> f64 {
        let total = self.cache_hit_count + self.cache_miss_count;
        if total == 0 {
            return 0.0;
        }
        let pct = self.cache_hit_count as f64 / total as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }

    /// Time since the last cycle finished, or `None` before the first one.
    pub fn cache_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_update_at.map(|at| now - at)
    }

    pub(crate) fn record_lookup(&mut self, hit: bool) {
        if hit {
            self.cache_hit_count += 1;
        } else {
            self.cache_miss_count += 1;
        }
    }

    pub(crate) fn record_cycle(&mut self, any_failed: bool, at: DateTime<Utc>) {
        self.update_count += 1;
        if any_failed {
            self.failed_update_count += 1;
        }
        self.last_update_at = Some(at);
    }
}

/// Point-in-time view of the orchestrator: refresh counters plus store contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    #[serde(flatten)]
    pub refresh: RefreshStatistics,
    pub hit_rate_percentage: f64,
    /// Whole seconds since the last cycle; `None` means no cycle has run.
    pub cache_age_seconds: Option<i64>,
    pub store: StoreStats,
    pub taken_at: DateTime<Utc>,
}

impl ServiceStats {
    pub fn new(refresh: RefreshStatistics, store: StoreStats, now: DateTime<Utc>) -> Self {
        Self {
            hit_rate_percentage: refresh.hit_rate_percentage(),
            cache_age_seconds: refresh.cache_age(now).map(|d| d.num_seconds()),
            refresh,
            store,
            taken_at: now,
        }
    }

    /// True until the first cycle has completed.
    pub fn is_empty(&self) -> bool {
        self.refresh.update_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn hit_rate_is_zero_without_lookups() {
        assert_eq!(RefreshStatistics::default().hit_rate_percentage(), 0.0);
    }

    #[test]
    fn hit_rate_rounds_to_two_places() {
        let mut s = RefreshStatistics::default();
        s.record_lookup(true);
        s.record_lookup(false);
        s.record_lookup(false);
        assert_eq!(s.hit_rate_percentage(), 33.33);
    }

    #[test]
    fn cycle_updates_counters() {
        let mut s = RefreshStatistics::default();
        s.record_cycle(false, at(1));
        s.record_cycle(true, at(2));
        assert_eq!(s.update_count, 2);
        assert_eq!(s.failed_update_count, 1);
        assert_eq!(s.last_update_at, Some(at(2)));
    }

    #[test]
    fn cache_age_needs_a_cycle() {
        let mut s = RefreshStatistics::default();
        assert_eq!(s.cache_age(at(5)), None);
        s.record_cycle(false, at(2));
        assert_eq!(s.cache_age(at(5)), Some(Duration::hours(3)));
    }

    #[test]
    fn snapshot_flattens_counters() {
        let mut refresh = RefreshStatistics::default();
        refresh.record_cycle(false, at(1));
        let stats = ServiceStats::new(refresh, StoreStats::default(), at(2));
        assert_eq!(stats.cache_age_seconds, Some(3600));
        assert!(!stats.is_empty());

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["update_count"], 1);
        assert_eq!(json["cache_age_seconds"], 3600);
    }

    proptest! {
        #[test]
        fn hit_rate_stays_in_range(hits in 0u64..10_000, misses in 0u64..10_000) {
            let s = RefreshStatistics {
                cache_hit_count: hits,
                cache_miss_count: misses,
                ..RefreshStatistics::default()
            };
            let rate = s.hit_rate_percentage();
            prop_assert!((0.0..=100.0).contains(&rate));
            if misses == 0 && hits > 0 {
                prop_assert_eq!(rate, 100.0);
            }
        }
    }
}
