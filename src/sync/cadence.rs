use std::time::Duration;

use crate::{configs::SyncConfig, sync::ClockEstimator};

/// Client-side request cadence: probe quickly until the sample window first
/// fills, then settle into a slow drift-correction rhythm.
#[derive(Debug, Clone, Copy)]
pub struct ProbeCadence {
    pub fast: Duration,
    pub steady: Duration,
    /// The connection is stale if no response arrives within this window.
    pub response_timeout: Duration,
}

impl ProbeCadence {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            fast: Duration::from_millis(config.fast_probe_interval_ms),
            steady: Duration::from_millis(config.steady_probe_interval_ms),
            response_timeout: Duration::from_millis(config.heartbeat_timeout_ms),
        }
    }

    pub fn next_delay(&self, estimator: &ClockEstimator) -> Duration {
        if estimator.is_synced() {
            self.steady
        } else {
            self.fast
        }
    }
}
