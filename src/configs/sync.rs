use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Lead added to `now` when stamping a scheduled action.
    #[serde(default = "default_schedule_lead_ms")]
    pub schedule_lead_ms: u64,
    /// Number of clock samples averaged per client.
    #[serde(default = "default_sample_window")]
    pub sample_window: usize,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_fast_probe_interval_ms")]
    pub fast_probe_interval_ms: u64,
    #[serde(default = "default_steady_probe_interval_ms")]
    pub steady_probe_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schedule_lead_ms: default_schedule_lead_ms(),
            sample_window: default_sample_window(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            fast_probe_interval_ms: default_fast_probe_interval_ms(),
            steady_probe_interval_ms: default_steady_probe_interval_ms(),
        }
    }
}

fn default_schedule_lead_ms() -> u64 {
    750
}

fn default_sample_window() -> usize {
    20
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_heartbeat_timeout_ms() -> u64 {
    15_000
}

fn default_fast_probe_interval_ms() -> u64 {
    30
}

fn default_steady_probe_interval_ms() -> u64 {
    5000
}
