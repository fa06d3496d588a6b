//! Clock-sync probe: joins a room, runs the client side of the sync
//! exchange and reports the estimate plus every scheduled action.
//!
//! Usage: `tandem-probe [ws://host:port] [roomId] [username] [play]`

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tandem::{
    common::{logger, types::AnyResult},
    configs::Config,
    protocol::{IncomingMessage, OutgoingMessage, RoomEvent},
    sync::{ClockEstimator, ClockSample, ProbeCadence},
};
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

fn epoch_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
        * 1000.0
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load().unwrap_or_default();
    logger::init(config.logging.as_ref());

    let mut args = std::env::args().skip(1);
    let base = args
        .next()
        .unwrap_or_else(|| format!("ws://127.0.0.1:{}", config.server.port));
    let room_id = args.next().unwrap_or_else(|| "123456".to_string());
    let username = args.next().unwrap_or_else(|| "probe".to_string());
    let host = args.next().is_some_and(|a| a == "play");
    let client_id = format!("probe-{}", uuid::Uuid::new_v4());

    let url = join_url(&base, &room_id, &username, &client_id)?;
    let (socket, _) = connect_async(url.as_str()).await?;
    info!("Connected to {} as {}", url, client_id);
    let (mut write, mut read) = socket.split();

    let cadence = ProbeCadence::from_config(&config.sync);
    let mut estimator = ClockEstimator::new(config.sync.sample_window);
    let mut awaiting_since: Option<Instant> = None;
    let mut sent_play = false;

    let probe = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(probe);

    loop {
        tokio::select! {
            _ = &mut probe => {
                if awaiting_since.is_some_and(|since| since.elapsed() > cadence.response_timeout) {
                    warn!("No NTP_RESPONSE within {:?}, closing", cadence.response_timeout);
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                let request = IncomingMessage::NtpRequest {
                    t0: epoch_ms(),
                    client_rtt: estimator.average_round_trip_ms(),
                };
                write.send(Message::text(serde_json::to_string(&request)?)).await?;
                if awaiting_since.is_none() {
                    awaiting_since = Some(Instant::now());
                }
                probe.as_mut().reset(Instant::now() + cadence.next_delay(&estimator));
            }
            msg = read.next() => {
                let Some(msg) = msg else {
                    info!("Server closed the connection");
                    break;
                };
                let msg = msg?;
                if msg.is_close() {
                    info!("Server closed the connection");
                    break;
                }
                if !msg.is_text() {
                    continue;
                }
                let frame: OutgoingMessage = match serde_json::from_str(msg.to_text()?) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Unreadable frame: {}", e);
                        continue;
                    }
                };

                match frame {
                    OutgoingMessage::NtpResponse { t0, t1, t2, .. } => {
                        awaiting_since = None;
                        let was_synced = estimator.is_synced();
                        estimator.record(ClockSample::new(t0, t1, t2, epoch_ms()));
                        let offset = estimator.average_offset_ms().unwrap_or_default();
                        let rtt = estimator.average_round_trip_ms().unwrap_or_default();
                        if estimator.is_synced() && !was_synced {
                            info!(
                                "Synced after {} samples: offset {:.2}ms, rtt {:.2}ms",
                                estimator.len(), offset, rtt
                            );
                            if host && !sent_play {
                                sent_play = true;
                                let play = IncomingMessage::Play {
                                    track_time_seconds: 0.0,
                                    audio_source: "probe.mp3".to_string(),
                                };
                                write.send(Message::text(serde_json::to_string(&play)?)).await?;
                            }
                        } else {
                            debug!("Sample {}: offset {:.2}ms, rtt {:.2}ms", estimator.len(), offset, rtt);
                        }
                    }
                    OutgoingMessage::ScheduledAction { scheduled_action, server_time_to_execute } => {
                        let wait = estimator.wait_until_ms(server_time_to_execute, epoch_ms());
                        info!("Scheduled {:?}: executes in {:.1}ms local time", scheduled_action, wait);
                    }
                    OutgoingMessage::RoomEvent { event: RoomEvent::ClientChange { clients } } => {
                        info!("Room {} now has {} client(s)", room_id, clients.len());
                    }
                    OutgoingMessage::RoomEvent { event } => debug!("Room event: {:?}", event),
                    OutgoingMessage::Error(e) => warn!("Server error: {}", e.message),
                    other => debug!("Frame: {:?}", other),
                }
            }
        }
    }

    Ok(())
}

/// `{base}/ws` with the join parameters percent-encoded.
fn join_url(base: &str, room_id: &str, username: &str, client_id: &str) -> AnyResult<Url> {
    let endpoint = format!("{}/ws", base.trim_end_matches('/'));
    Ok(Url::parse_with_params(
        &endpoint,
        [
            ("roomId", room_id),
            ("username", username),
            ("clientId", client_id),
        ],
    )?)
}
