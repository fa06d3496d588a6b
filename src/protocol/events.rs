use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    common::{errors::ErrorFrame, types::ClientId},
    protocol::models::{AudioSource, ClientInfo, GainUpdate, PlaybackPermissions, Position},
};

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingMessage {
    #[serde(rename_all = "camelCase")]
    NtpResponse {
        t0: f64,
        t1: f64,
        t2: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_rtt: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    ScheduledAction {
        scheduled_action: ScheduledAction,
        server_time_to_execute: f64,
    },
    RoomEvent {
        event: RoomEvent,
    },
    SearchResponse {
        response: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    StreamResponse {
        track_id: String,
        url: String,
    },
    Error(ErrorFrame),
}

/// Payload of a `SCHEDULED_ACTION`, executed by every client at
/// `serverTimeToExecute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduledAction {
    #[serde(rename_all = "camelCase")]
    Play {
        audio_source: String,
        track_time_seconds: f64,
    },
    #[serde(rename_all = "camelCase")]
    Pause {
        audio_source: String,
        track_time_seconds: f64,
    },
    #[serde(rename_all = "camelCase")]
    SpatialConfig {
        listening_source: Position,
        gains: BTreeMap<ClientId, GainUpdate>,
    },
    StopSpatialAudio,
}

/// Room membership and configuration changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEvent {
    ClientChange { clients: Vec<ClientInfo> },
    SetAudioSources { sources: Vec<AudioSource> },
    SetPlaybackControls { permissions: PlaybackPermissions },
}

impl OutgoingMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorFrame::new(message))
    }

    pub fn scheduled(action: ScheduledAction, server_time_to_execute: f64) -> Self {
        Self::ScheduledAction {
            scheduled_action: action,
            server_time_to_execute,
        }
    }

    pub fn room_event(event: RoomEvent) -> Self {
        Self::RoomEvent { event }
    }
}
