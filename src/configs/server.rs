use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds between periodic room snapshots.
    #[serde(default = "default_backup_interval_secs")]
    pub backup_interval_secs: u64,
    /// Seconds between orphaned-storage sweeps.
    #[serde(default = "default_orphan_sweep_interval_secs")]
    pub orphan_sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backup_interval_secs: default_backup_interval_secs(),
            orphan_sweep_interval_secs: default_orphan_sweep_interval_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_backup_interval_secs() -> u64 {
    60
}

fn default_orphan_sweep_interval_secs() -> u64 {
    600
}
