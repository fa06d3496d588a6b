use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::{common::types::RoomId, server::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub uptime_secs: u64,
    pub rooms: usize,
    pub clients: usize,
    pub room_summaries: Vec<RoomSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub clients: usize,
    pub playing: bool,
    pub spatial_active: bool,
}

/// GET /
pub async fn get_root() -> &'static str {
    "tandem is running"
}

/// GET /stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    tracing::debug!("GET /stats");
    let room_summaries: Vec<RoomSummary> = state
        .registry
        .room_ids()
        .into_iter()
        .filter_map(|room_id| {
            let entry = state.registry.get(&room_id)?;
            let room = entry.lock();
            Some(RoomSummary {
                clients: room.len(),
                playing: room.playback().is_playing(),
                spatial_active: room.spatial().active,
                room_id,
            })
        })
        .collect();

    Json(Stats {
        uptime_secs: state.started_at.elapsed().as_secs(),
        rooms: room_summaries.len(),
        clients: room_summaries.iter().map(|r| r.clients).sum(),
        room_summaries,
    })
}
