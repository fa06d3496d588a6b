use std::{sync::Arc, time::Instant};

use crate::{configs::Config, provider::MusicProvider, room::RoomRegistry};

/// Top-level application state.
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub provider: Arc<MusicProvider>,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, registry: Arc<RoomRegistry>) -> Self {
        Self {
            provider: Arc::new(MusicProvider::new(&config.provider)),
            registry,
            config,
            started_at: Instant::now(),
        }
    }
}
