use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoomConfig {
    /// How long an empty room survives before it is deleted.
    #[serde(default = "default_cleanup_grace_secs")]
    pub cleanup_grace_secs: u64,
    /// Width and height of the shared coordinate space.
    #[serde(default = "default_grid_size")]
    pub grid_size: f64,
    /// Radius of the circle clients are laid out on.
    #[serde(default = "default_client_radius")]
    pub client_radius: f64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            cleanup_grace_secs: default_cleanup_grace_secs(),
            grid_size: default_grid_size(),
            client_radius: default_client_radius(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SpatialConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_ramp_time_secs")]
    pub ramp_time_secs: f64,
    #[serde(default = "default_max_gain")]
    pub max_gain: f64,
    #[serde(default = "default_min_gain")]
    pub min_gain: f64,
    #[serde(default = "default_falloff")]
    pub falloff: f64,
    #[serde(default = "default_speed")]
    pub default_speed: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            ramp_time_secs: default_ramp_time_secs(),
            max_gain: default_max_gain(),
            min_gain: default_min_gain(),
            falloff: default_falloff(),
            default_speed: default_speed(),
        }
    }
}

fn default_cleanup_grace_secs() -> u64 {
    60
}

fn default_grid_size() -> f64 {
    100.0
}

fn default_client_radius() -> f64 {
    25.0
}

fn default_tick_ms() -> u64 {
    100
}

fn default_ramp_time_secs() -> f64 {
    0.25
}

fn default_max_gain() -> f64 {
    1.0
}

fn default_min_gain() -> f64 {
    0.15
}

fn default_falloff() -> f64 {
    0.05
}

fn default_speed() -> f64 {
    1.0
}
