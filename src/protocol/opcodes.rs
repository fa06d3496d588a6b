use serde::{Deserialize, Serialize};

use crate::{
    common::types::ClientId,
    protocol::models::{Location, PlaybackPermissions, Position, SpatialEffect},
};

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingMessage {
    #[serde(rename_all = "camelCase")]
    NtpRequest {
        t0: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_rtt: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Play {
        track_time_seconds: f64,
        audio_source: String,
    },
    #[serde(rename_all = "camelCase")]
    Pause {
        track_time_seconds: f64,
        audio_source: String,
    },
    #[serde(rename_all = "camelCase")]
    StartSpatialAudio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        effect_type: Option<SpatialEffect>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
    },
    StopSpatialAudio,
    SetListeningSource {
        x: f64,
        y: f64,
    },
    #[serde(rename_all = "camelCase")]
    MoveClient {
        client_id: ClientId,
        position: Position,
    },
    #[serde(rename_all = "camelCase")]
    ReorderClient {
        client_id: ClientId,
    },
    Sync,
    #[serde(rename_all = "camelCase")]
    SetAdmin {
        client_id: ClientId,
        is_admin: bool,
    },
    SetPlaybackControls {
        permissions: PlaybackPermissions,
    },
    SendIp {
        #[serde(default)]
        location: Location,
    },
    SearchMusic {
        query: String,
        #[serde(default)]
        offset: u32,
    },
    #[serde(rename_all = "camelCase")]
    StreamMusic {
        track_id: String,
    },
    DeleteAudioSources {
        urls: Vec<String>,
    },
}

impl IncomingMessage {
    /// Tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NtpRequest { .. } => "NTP_REQUEST",
            Self::Play { .. } => "PLAY",
            Self::Pause { .. } => "PAUSE",
            Self::StartSpatialAudio { .. } => "START_SPATIAL_AUDIO",
            Self::StopSpatialAudio => "STOP_SPATIAL_AUDIO",
            Self::SetListeningSource { .. } => "SET_LISTENING_SOURCE",
            Self::MoveClient { .. } => "MOVE_CLIENT",
            Self::ReorderClient { .. } => "REORDER_CLIENT",
            Self::Sync => "SYNC",
            Self::SetAdmin { .. } => "SET_ADMIN",
            Self::SetPlaybackControls { .. } => "SET_PLAYBACK_CONTROLS",
            Self::SendIp { .. } => "SEND_IP",
            Self::SearchMusic { .. } => "SEARCH_MUSIC",
            Self::StreamMusic { .. } => "STREAM_MUSIC",
            Self::DeleteAudioSources { .. } => "DELETE_AUDIO_SOURCES",
        }
    }

    /// Checks value ranges serde cannot express. Err carries the reason.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            Self::NtpRequest { t0, client_rtt } => {
                if !t0.is_finite() {
                    return Err("t0 must be a finite timestamp");
                }
                if client_rtt.is_some_and(|rtt| !rtt.is_finite() || rtt < 0.0) {
                    return Err("clientRtt must be a non-negative number");
                }
            }
            Self::Play {
                track_time_seconds,
                audio_source,
            }
            | Self::Pause {
                track_time_seconds,
                audio_source,
            } => {
                if !track_time_seconds.is_finite() || *track_time_seconds < 0.0 {
                    return Err("trackTimeSeconds must be a non-negative number");
                }
                if audio_source.trim().is_empty() {
                    return Err("audioSource is required");
                }
            }
            Self::StartSpatialAudio { speed, .. } => {
                if speed.is_some_and(|s| !s.is_finite() || s <= 0.0) {
                    return Err("speed must be a positive number");
                }
            }
            Self::SetListeningSource { x, y } => {
                if !Position::new(*x, *y).is_finite() {
                    return Err("listening source must be finite");
                }
            }
            Self::MoveClient { client_id, position } => {
                if client_id.is_empty() || !position.is_finite() {
                    return Err("invalid client position");
                }
            }
            Self::ReorderClient { client_id } | Self::SetAdmin { client_id, .. } => {
                if client_id.is_empty() {
                    return Err("clientId is required");
                }
            }
            Self::SearchMusic { query, .. } => {
                if query.trim().is_empty() {
                    return Err("query is required");
                }
            }
            Self::StreamMusic { track_id } => {
                if track_id.trim().is_empty() {
                    return Err("trackId is required");
                }
            }
            Self::StopSpatialAudio
            | Self::Sync
            | Self::SetPlaybackControls { .. }
            | Self::SendIp { .. }
            | Self::DeleteAudioSources { .. } => {}
        }
        Ok(())
    }
}
