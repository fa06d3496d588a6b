use serde::{Deserialize, Serialize};

use crate::protocol::{OutgoingMessage, ScheduledAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
}

/// `track_position_secs` was true at server time `server_time_ms`. While
/// playing, the position at any later server time is a linear extrapolation
/// from that mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub audio_source: String,
    pub track_position_secs: f64,
    pub server_time_ms: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Paused,
            audio_source: String::new(),
            track_position_secs: 0.0,
            server_time_ms: 0.0,
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// Track position, in seconds, at `server_ms`.
    pub fn position_at(&self, server_ms: f64) -> f64 {
        match self.status {
            PlaybackStatus::Playing => {
                self.track_position_secs + (server_ms - self.server_time_ms).max(0.0) / 1000.0
            }
            PlaybackStatus::Paused => self.track_position_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
}

/// Stamps play/pause requests with a future execution time and answers
/// late-join resyncs.
#[derive(Debug, Clone, Copy)]
pub struct Coordinator {
    lead_ms: f64,
}

impl Coordinator {
    pub fn new(lead_ms: u64) -> Self {
        Self {
            lead_ms: lead_ms as f64,
        }
    }

    pub fn lead_ms(&self) -> f64 {
        self.lead_ms
    }

    /// Records the requested transition and returns the frame to broadcast.
    /// The client-declared track time is trusted as the new mark.
    pub fn schedule(
        &self,
        state: &mut PlaybackState,
        command: PlaybackCommand,
        audio_source: String,
        track_time_secs: f64,
        now_ms: f64,
    ) -> OutgoingMessage {
        let status = match command {
            PlaybackCommand::Play => PlaybackStatus::Playing,
            PlaybackCommand::Pause => PlaybackStatus::Paused,
        };
        *state = PlaybackState {
            status,
            audio_source: audio_source.clone(),
            track_position_secs: track_time_secs,
            server_time_ms: now_ms,
        };

        let action = match command {
            PlaybackCommand::Play => ScheduledAction::Play {
                audio_source,
                track_time_seconds: track_time_secs,
            },
            PlaybackCommand::Pause => ScheduledAction::Pause {
                audio_source,
                track_time_seconds: track_time_secs,
            },
        };
        OutgoingMessage::scheduled(action, now_ms + self.lead_ms)
    }

    /// Play frame for a client catching up, positioned where the track will
    /// be when the frame executes. Nothing to send while paused.
    pub fn resync(&self, state: &PlaybackState, now_ms: f64) -> Option<OutgoingMessage> {
        if !state.is_playing() {
            return None;
        }
        let execute_at = now_ms + self.lead_ms;
        Some(OutgoingMessage::scheduled(
            ScheduledAction::Play {
                audio_source: state.audio_source.clone(),
                track_time_seconds: state.position_at(execute_at),
            },
            execute_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_time(msg: &OutgoingMessage) -> (f64, f64) {
        match msg {
            OutgoingMessage::ScheduledAction {
                scheduled_action: ScheduledAction::Play {
                    track_time_seconds, ..
                },
                server_time_to_execute,
            } => (*track_time_seconds, *server_time_to_execute),
            other => panic!("expected scheduled play, got {:?}", other),
        }
    }

    #[test]
    fn schedule_stamps_lead_and_records_mark() {
        let coordinator = Coordinator::new(750);
        let mut state = PlaybackState::default();
        let msg = coordinator.schedule(&mut state, PlaybackCommand::Play, "x.mp3".into(), 12.0, 10_000.0);
        assert_eq!(play_time(&msg), (12.0, 10_750.0));
        assert!(state.is_playing());
        assert_eq!(state.audio_source, "x.mp3");
        assert_eq!(state.track_position_secs, 12.0);
        assert_eq!(state.server_time_ms, 10_000.0);
    }

    #[test]
    fn pause_is_scheduled_too() {
        let coordinator = Coordinator::new(750);
        let mut state = PlaybackState::default();
        let msg = coordinator.schedule(&mut state, PlaybackCommand::Pause, "x.mp3".into(), 30.0, 0.0);
        assert!(matches!(
            msg,
            OutgoingMessage::ScheduledAction {
                scheduled_action: ScheduledAction::Pause { .. },
                server_time_to_execute
            } if server_time_to_execute == 750.0
        ));
        assert!(!state.is_playing());
    }

    #[test]
    fn resync_while_paused_sends_nothing() {
        let coordinator = Coordinator::new(750);
        let mut state = PlaybackState::default();
        assert!(coordinator.resync(&state, 0.0).is_none());
        coordinator.schedule(&mut state, PlaybackCommand::Pause, "x.mp3".into(), 5.0, 0.0);
        assert!(coordinator.resync(&state, 60_000.0).is_none());
    }

    #[test]
    fn resync_extrapolates_to_execution_time() {
        let coordinator = Coordinator::new(750);
        let mut state = PlaybackState::default();
        coordinator.schedule(&mut state, PlaybackCommand::Play, "x.mp3".into(), 0.0, 1_000.0);
        let msg = coordinator.resync(&state, 6_000.0).unwrap();
        let (resume, execute_at) = play_time(&msg);
        assert_eq!(execute_at, 6_750.0);
        assert!((resume - 5.75).abs() < 1e-9);
    }

    #[test]
    fn resync_never_moves_backwards() {
        let coordinator = Coordinator::new(750);
        let mut state = PlaybackState::default();
        coordinator.schedule(&mut state, PlaybackCommand::Pause, "x.mp3".into(), 42.0, 0.0);
        coordinator.schedule(&mut state, PlaybackCommand::Play, "x.mp3".into(), 42.0, 100.0);
        for now in [100.0, 100.5, 2_000.0] {
            let (resume, _) = play_time(&coordinator.resync(&state, now).unwrap());
            assert!(resume >= 42.0);
        }
    }
}
