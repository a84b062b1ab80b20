//! tickcache runner: refresh orchestration on top of `tickcache-core`.
//!
//! This crate provides:
//! - The `Orchestrator`: parallel per-symbol refresh cycles on a private pool
//! - The background refresh loop with prompt, bounded stop
//! - Refresh statistics and the merged `ServiceStats` snapshot
//! - Health evaluation and random spot checks over served data

pub mod background;
pub mod health;
pub mod orchestrator;
pub mod spot_check;
pub mod stats;

pub use health::HealthReport;
pub use orchestrator::{
    CycleReport, CyclePhase, Orchestrator, OrchestratorError, SymbolFailure, SymbolOutcome,
};
pub use spot_check::{spot_check, SpotCheckReport, SpotSample};
pub use stats::{RefreshStatistics, ServiceStats};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn orchestrator_is_send_sync() {
        assert_send::<Orchestrator>();
        assert_sync::<Orchestrator>();
    }

    #[test]
    fn reports_are_send_sync() {
        assert_send::<CycleReport>();
        assert_sync::<CycleReport>();
        assert_send::<ServiceStats>();
        assert_sync::<ServiceStats>();
        assert_send::<HealthReport>();
        assert_sync::<HealthReport>();
    }
}
