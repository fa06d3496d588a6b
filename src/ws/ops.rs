use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    common::errors::ErrorFrame,
    protocol::{self, AudioSource, IncomingMessage, OutgoingMessage, Position},
    room::{PlaybackCommand, Room, RoomEntry, broadcast::reply},
    server::AppState,
    storage,
    ws::Connection,
};

/// Parses, validates and dispatches one inbound text frame. Bad frames get an
/// `ERROR` reply; the connection stays open.
pub fn handle_text(state: &Arc<AppState>, conn: &Connection, text: &str, received_at: f64) {
    let op = match protocol::decode(text) {
        Ok(op) => op,
        Err(e) => {
            warn!(
                "Malformed message: room={} client={} err={}",
                conn.room_id, conn.client_id, e
            );
            reply(&conn.outbox, &OutgoingMessage::Error(ErrorFrame::malformed()));
            return;
        }
    };
    if let Err(reason) = op.validate() {
        warn!(
            "Rejected {}: room={} client={} reason={}",
            op.kind(),
            conn.room_id,
            conn.client_id,
            reason
        );
        reply(&conn.outbox, &OutgoingMessage::error(reason));
        return;
    }
    handle_op(op, state, conn, received_at);
}

/// Applies one validated message. `received_at` is the server time the frame
/// arrived, used as `t1` for clock sync and as the mark for resyncs.
pub fn handle_op(op: IncomingMessage, state: &Arc<AppState>, conn: &Connection, received_at: f64) {
    let registry = &state.registry;
    let Some(entry) = registry.get(&conn.room_id) else {
        debug!("Room {} is gone, dropping {}", conn.room_id, op.kind());
        return;
    };
    let current = entry
        .lock()
        .client(&conn.client_id)
        .is_some_and(|client| client.is_connection(&conn.outbox));
    if !current {
        debug!(
            "Dropping {} from replaced connection: room={} client={}",
            op.kind(),
            conn.room_id,
            conn.client_id
        );
        return;
    }
    let kind = op.kind();

    match op {
        IncomingMessage::NtpRequest { t0, client_rtt } => {
            entry
                .lock()
                .record_heartbeat(&conn.client_id, received_at, client_rtt);
            reply(
                &conn.outbox,
                &OutgoingMessage::NtpResponse {
                    t0,
                    t1: received_at,
                    t2: registry.now_ms(),
                    client_rtt,
                },
            );
        }
        IncomingMessage::Play {
            track_time_seconds,
            audio_source,
        } => schedule(
            state,
            &entry,
            conn,
            PlaybackCommand::Play,
            audio_source,
            track_time_seconds,
        ),
        IncomingMessage::Pause {
            track_time_seconds,
            audio_source,
        } => schedule(
            state,
            &entry,
            conn,
            PlaybackCommand::Pause,
            audio_source,
            track_time_seconds,
        ),
        IncomingMessage::Sync => {
            let resync = registry
                .coordinator()
                .resync(entry.lock().playback(), received_at);
            if let Some(msg) = resync {
                reply(&conn.outbox, &msg);
            }
        }
        IncomingMessage::StartSpatialAudio { effect_type, speed } => {
            if !may_control(&entry.lock(), conn, kind) {
                return;
            }
            registry.start_spatial(&conn.room_id, effect_type, speed);
        }
        IncomingMessage::StopSpatialAudio => {
            if !may_control(&entry.lock(), conn, kind) {
                return;
            }
            registry.stop_spatial(&conn.room_id);
        }
        IncomingMessage::SetListeningSource { x, y } => {
            let mut room = entry.lock();
            if !may_control(&room, conn, kind) {
                return;
            }
            room.set_listening_source(Position::new(x, y));
            room.broadcast(&registry.gains_frame(&room));
        }
        IncomingMessage::MoveClient {
            client_id,
            position,
        } => {
            let mut room = entry.lock();
            if !may_control(&room, conn, kind) {
                return;
            }
            if room.move_client(&client_id, position) {
                room.broadcast(&room.client_change());
                room.broadcast(&registry.gains_frame(&room));
            }
        }
        IncomingMessage::ReorderClient { client_id } => {
            let mut room = entry.lock();
            if !may_control(&room, conn, kind) {
                return;
            }
            if room.reorder_client(&client_id) {
                room.broadcast(&room.client_change());
                room.broadcast(&registry.gains_frame(&room));
            }
        }
        IncomingMessage::SetAdmin {
            client_id,
            is_admin,
        } => {
            let mut room = entry.lock();
            if !is_admin_sender(&room, conn, kind) {
                return;
            }
            if room.set_admin(&client_id, is_admin) {
                info!(
                    "Admin change in room {}: {} is_admin={} (by {})",
                    conn.room_id, client_id, is_admin, conn.client_id
                );
                room.broadcast(&room.client_change());
            }
        }
        IncomingMessage::SetPlaybackControls { permissions } => {
            let mut room = entry.lock();
            if !is_admin_sender(&room, conn, kind) || room.permissions() == permissions {
                return;
            }
            info!(
                "Playback controls in room {} set to {:?}",
                conn.room_id, permissions
            );
            room.set_permissions(permissions);
            room.broadcast(&room.controls_event());
        }
        IncomingMessage::SendIp { location } => {
            let mut room = entry.lock();
            if room.set_location(&conn.client_id, location) {
                room.broadcast(&room.client_change());
            }
        }
        IncomingMessage::SearchMusic { query, offset } => {
            search(state, conn, query, offset);
        }
        IncomingMessage::StreamMusic { track_id } => {
            if !may_control(&entry.lock(), conn, kind) {
                return;
            }
            stream(state, conn, track_id);
        }
        IncomingMessage::DeleteAudioSources { urls } => {
            let removed = {
                let mut room = entry.lock();
                if !may_control(&room, conn, kind) {
                    return;
                }
                let removed = room.remove_audio_sources(&urls);
                if !removed.is_empty() {
                    room.broadcast(&room.audio_sources_event());
                }
                removed
            };
            purge_sources(state, conn, removed);
        }
    }
}

fn may_control(room: &Room, conn: &Connection, kind: &str) -> bool {
    let allowed = room.can_control(&conn.client_id);
    if !allowed {
        debug!(
            "Dropped {} from {} in room {}: not permitted",
            kind, conn.client_id, conn.room_id
        );
    }
    allowed
}

fn is_admin_sender(room: &Room, conn: &Connection, kind: &str) -> bool {
    let allowed = room.is_admin(&conn.client_id);
    if !allowed {
        debug!(
            "Dropped {} from {} in room {}: admin only",
            kind, conn.client_id, conn.room_id
        );
    }
    allowed
}

fn schedule(
    state: &AppState,
    entry: &RoomEntry,
    conn: &Connection,
    command: PlaybackCommand,
    audio_source: String,
    track_time_secs: f64,
) {
    let registry = &state.registry;
    let mut room = entry.lock();
    if !may_control(&room, conn, "playback") {
        return;
    }
    let msg = registry.coordinator().schedule(
        room.playback_mut(),
        command,
        audio_source,
        track_time_secs,
        registry.now_ms(),
    );
    info!(
        "{:?} scheduled in room {} by {} at track {:.3}s",
        command, conn.room_id, conn.client_id, track_time_secs
    );
    room.broadcast(&msg);
}

fn search(state: &AppState, conn: &Connection, query: String, offset: u32) {
    let provider = state.provider.clone();
    let conn = conn.clone();
    tokio::spawn(async move {
        let msg = match provider.search(&query, offset).await {
            Ok(response) => OutgoingMessage::SearchResponse { response },
            Err(e) => {
                warn!(
                    "Search failed: room={} client={} err={}",
                    conn.room_id, conn.client_id, e
                );
                OutgoingMessage::error(format!("Search failed: {}", e))
            }
        };
        reply(&conn.outbox, &msg);
    });
}

fn stream(state: &Arc<AppState>, conn: &Connection, track_id: String) {
    let state = state.clone();
    let conn = conn.clone();
    tokio::spawn(async move {
        let url = match state.provider.stream(&track_id).await {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    "Stream lookup failed: room={} client={} track={} err={}",
                    conn.room_id, conn.client_id, track_id, e
                );
                reply(
                    &conn.outbox,
                    &OutgoingMessage::error(format!("Stream failed: {}", e)),
                );
                return;
            }
        };

        // the room may have been cleaned up while the request was in flight
        let Some(entry) = state.registry.get(&conn.room_id) else {
            debug!("Room {} vanished during stream lookup", conn.room_id);
            return;
        };
        reply(
            &conn.outbox,
            &OutgoingMessage::StreamResponse {
                track_id,
                url: url.clone(),
            },
        );
        let mut room = entry.lock();
        if room.add_audio_source(AudioSource::new(url)) {
            room.broadcast(&room.audio_sources_event());
        }
    });
}

/// Deletes stored objects backing removed sources. Best-effort.
fn purge_sources(state: &AppState, conn: &Connection, removed: Vec<AudioSource>) {
    let prefix = conn.room_id.storage_prefix();
    let keys: Vec<String> = removed
        .iter()
        .filter_map(|source| storage::key_for_url(&prefix, &source.url))
        .collect();
    if keys.is_empty() {
        return;
    }
    let store = state.registry.store().clone();
    let room_id = conn.room_id.clone();
    tokio::spawn(async move {
        for key in keys {
            if let Err(e) = store.delete(&key).await {
                warn!("Failed to delete {} for room {}: {}", key, room_id, e);
            }
        }
    });
}
