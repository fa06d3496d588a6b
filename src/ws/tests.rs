use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use serde_json::{Value, json};

use super::{Connection, handle_text};
use crate::{
    common::types::{ClientId, RoomId},
    configs::Config,
    protocol::{
        AudioSource, OutgoingMessage, PlaybackPermissions, Position, RoomEvent, ScheduledAction,
    },
    room::{Inbox, Outbound, RoomRegistry, broadcast::channel},
    server::AppState,
    storage::MemoryStore,
};

struct Peer {
    conn: Connection,
    rx: Inbox,
}

impl Peer {
    fn send(&self, state: &Arc<AppState>, msg: Value) {
        handle_text(state, &self.conn, &msg.to_string(), state.registry.now_ms());
    }

    fn send_raw(&self, state: &Arc<AppState>, text: &str) {
        handle_text(state, &self.conn, text, state.registry.now_ms());
    }

    fn drain(&self) -> Vec<OutgoingMessage> {
        self.rx
            .try_iter()
            .filter_map(|frame| match frame {
                Outbound::Text(json) => Some(serde_json::from_str(&json).unwrap()),
                Outbound::Close => None,
            })
            .collect()
    }

    async fn next(&self) -> OutgoingMessage {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.rx.recv_async())
            .await
            .unwrap()
            .unwrap();
        match frame {
            Outbound::Text(json) => serde_json::from_str(&json).unwrap(),
            Outbound::Close => panic!("unexpected close"),
        }
    }
}

fn app_with(config: Config) -> Arc<AppState> {
    let config = Arc::new(config);
    let registry = RoomRegistry::new(config.clone(), Arc::new(MemoryStore::new()));
    Arc::new(AppState::new(config, registry))
}

fn app() -> Arc<AppState> {
    app_with(Config::default())
}

fn room_id() -> RoomId {
    RoomId::from("123456")
}

fn join(state: &Arc<AppState>, client_id: &str, username: &str) -> Peer {
    let (tx, rx) = channel();
    state
        .registry
        .add_client(&room_id(), client_id.into(), username.into(), tx.clone());
    Peer {
        conn: Connection {
            room_id: room_id(),
            client_id: client_id.into(),
            outbox: tx,
        },
        rx,
    }
}

fn scheduled(msgs: &[OutgoingMessage]) -> Vec<(ScheduledAction, f64)> {
    msgs.iter()
        .filter_map(|msg| match msg {
            OutgoingMessage::ScheduledAction {
                scheduled_action,
                server_time_to_execute,
            } => Some((scheduled_action.clone(), *server_time_to_execute)),
            _ => None,
        })
        .collect()
}

fn clients_of(msgs: &[OutgoingMessage]) -> Option<Vec<crate::protocol::ClientInfo>> {
    msgs.iter().rev().find_map(|msg| match msg {
        OutgoingMessage::RoomEvent {
            event: RoomEvent::ClientChange { clients },
        } => Some(clients.clone()),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn late_join_resumes_at_extrapolated_position() {
    let state = app();
    let a = join(&state, "a", "Alice");
    let b = join(&state, "b", "Bob");
    assert_eq!(
        clients_of(&a.drain()).unwrap().iter().filter(|c| c.is_admin).count(),
        1
    );
    b.drain();

    let now = state.registry.now_ms();
    a.send(
        &state,
        json!({"type": "PLAY", "trackTimeSeconds": 0, "audioSource": "x.mp3"}),
    );
    let at_a = scheduled(&a.drain());
    let at_b = scheduled(&b.drain());
    assert_eq!(at_a.len(), 1);
    assert_eq!(at_a, at_b);
    assert!((at_a[0].1 - (now + 750.0)).abs() < 1e-6);

    state
        .registry
        .remove_client(&room_id(), &"b".into(), Some(&b.conn.outbox));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let b = join(&state, "b", "Bob");
    b.drain();
    b.send(&state, json!({"type": "SYNC"}));
    match scheduled(&b.drain()).as_slice() {
        [(ScheduledAction::Play { audio_source, track_time_seconds }, _)] => {
            assert_eq!(audio_source, "x.mp3");
            assert!((track_time_seconds - 5.75).abs() < 0.01);
        }
        other => panic!("expected one play, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn sync_while_paused_sends_nothing() {
    let state = app();
    let a = join(&state, "a", "Alice");
    a.send(
        &state,
        json!({"type": "PAUSE", "trackTimeSeconds": 12, "audioSource": "x.mp3"}),
    );
    a.drain();
    a.send(&state, json!({"type": "SYNC"}));
    assert!(a.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rotation_favours_nearest_client() {
    let state = app();
    let peers = [
        join(&state, "a", "A"),
        join(&state, "b", "B"),
        join(&state, "c", "C"),
    ];
    for (id, x) in [("a", 0.0), ("b", 50.0), ("c", 100.0)] {
        peers[0].send(
            &state,
            json!({"type": "MOVE_CLIENT", "clientId": id, "position": {"x": x, "y": 50}}),
        );
    }
    for peer in &peers {
        peer.drain();
    }

    peers[0].send(
        &state,
        json!({"type": "START_SPATIAL_AUDIO", "effectType": "rotation"}),
    );
    tokio::time::sleep(Duration::from_millis(150)).await;

    let frames = scheduled(&peers[1].drain());
    let [(ScheduledAction::SpatialConfig { listening_source, gains }, _)] = frames.as_slice()
    else {
        panic!("expected one spatial tick, got {:?}", frames);
    };
    let center = Position::new(50.0, 50.0);
    assert!((listening_source.distance(&center) - 25.0).abs() < 1e-9);

    let positions = [
        ("a", Position::new(0.0, 50.0)),
        ("b", Position::new(50.0, 50.0)),
        ("c", Position::new(100.0, 50.0)),
    ];
    let (nearest, _) = positions
        .iter()
        .min_by(|l, r| {
            l.1.distance(listening_source)
                .total_cmp(&r.1.distance(listening_source))
        })
        .unwrap();
    let nearest_gain = gains[&ClientId::from(*nearest)].gain;
    for (id, _) in positions.iter().filter(|(id, _)| id != nearest) {
        assert!(nearest_gain > gains[&ClientId::from(*id)].gain);
    }

    peers[0].send(&state, json!({"type": "STOP_SPATIAL_AUDIO"}));
    peers[0].send(&state, json!({"type": "STOP_SPATIAL_AUDIO"}));
    let resets: Vec<_> = scheduled(&peers[2].drain())
        .into_iter()
        .filter(|(action, _)| *action == ScheduledAction::StopSpatialAudio)
        .collect();
    assert_eq!(resets.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ntp_reply_echoes_and_keeps_client_alive() {
    let state = app();
    let a = join(&state, "a", "Alice");
    let b = join(&state, "b", "Bob");
    a.drain();

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        a.send(
            &state,
            json!({"type": "NTP_REQUEST", "t0": 42.5, "clientRtt": 18}),
        );
        match a.drain().last() {
            Some(OutgoingMessage::NtpResponse { t0, t1, t2, client_rtt }) => {
                assert_eq!(*t0, 42.5);
                assert!(t2 >= t1);
                assert_eq!(*client_rtt, Some(18.0));
            }
            other => panic!("expected NTP_RESPONSE, got {:?}", other),
        }
    }

    let entry = state.registry.get(&room_id()).unwrap();
    let room = entry.lock();
    assert!(room.client(&"a".into()).is_some());
    assert!(room.client(&"b".into()).is_none());
    assert_eq!(room.client(&"a".into()).unwrap().rtt, 18.0);
    drop(room);
    assert!(b.rx.try_iter().any(|frame| frame == Outbound::Close));
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_get_error_and_connection_survives() {
    let state = app();
    let a = join(&state, "a", "Alice");
    a.drain();

    a.send_raw(&state, "{not json");
    a.send(&state, json!({"type": "PLAY", "trackTimeSeconds": -3, "audioSource": "x"}));
    let errors = a.drain();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|m| matches!(m, OutgoingMessage::Error(_))));

    a.send(&state, json!({"type": "NTP_REQUEST", "t0": 1}));
    assert!(matches!(
        a.drain().as_slice(),
        [OutgoingMessage::NtpResponse { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn admin_only_mode_drops_member_actions() {
    let state = app();
    let a = join(&state, "a", "Alice");
    let b = join(&state, "b", "Bob");

    a.send(
        &state,
        json!({"type": "SET_PLAYBACK_CONTROLS", "permissions": "ADMIN_ONLY"}),
    );
    assert!(b.drain().iter().any(|m| matches!(
        m,
        OutgoingMessage::RoomEvent {
            event: RoomEvent::SetPlaybackControls {
                permissions: PlaybackPermissions::AdminOnly
            }
        }
    )));
    a.drain();

    b.send(&state, json!({"type": "PLAY", "trackTimeSeconds": 1, "audioSource": "x.mp3"}));
    b.send(&state, json!({"type": "SET_LISTENING_SOURCE", "x": 1, "y": 1}));
    b.send(&state, json!({"type": "SET_ADMIN", "clientId": "b", "isAdmin": true}));
    b.send(&state, json!({"type": "START_SPATIAL_AUDIO"}));
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());

    let entry = state.registry.get(&room_id()).unwrap();
    assert!(!entry.lock().playback().is_playing());
    assert!(!entry.lock().spatial().active);
}

#[tokio::test(start_paused = true)]
async fn last_admin_cannot_step_down() {
    let state = app();
    let a = join(&state, "a", "Alice");
    let _b = join(&state, "b", "Bob");
    a.drain();

    a.send(&state, json!({"type": "SET_ADMIN", "clientId": "a", "isAdmin": false}));
    assert!(a.drain().is_empty());

    a.send(&state, json!({"type": "SET_ADMIN", "clientId": "b", "isAdmin": true}));
    a.send(&state, json!({"type": "SET_ADMIN", "clientId": "a", "isAdmin": false}));
    let clients = clients_of(&a.drain()).unwrap();
    let admins: Vec<_> = clients
        .iter()
        .filter(|c| c.is_admin)
        .map(|c| c.client_id.to_string())
        .collect();
    assert_eq!(admins, ["b"]);

    // reconnecting keeps the cached flag
    state.registry.remove_client(&room_id(), &"b".into(), None);
    let b = join(&state, "b", "Bob");
    let clients = clients_of(&b.drain()).unwrap();
    assert!(clients.iter().any(|c| &*c.client_id == "b" && c.is_admin));
}

#[tokio::test(start_paused = true)]
async fn send_ip_updates_client_list() {
    let state = app();
    let a = join(&state, "a", "Alice");
    a.drain();
    a.send(
        &state,
        json!({"type": "SEND_IP", "location": {"country": "Norway", "countryCode": "NO", "city": "Oslo"}}),
    );
    let clients = clients_of(&a.drain()).unwrap();
    let location = clients[0].location.clone().unwrap();
    assert_eq!(location.city.as_deref(), Some("Oslo"));
    assert_eq!(location.country_code.as_deref(), Some("NO"));
}

#[tokio::test(start_paused = true)]
async fn reorder_moves_client_to_front() {
    let state = app();
    let a = join(&state, "a", "A");
    let _b = join(&state, "b", "B");
    let _c = join(&state, "c", "C");
    a.drain();

    a.send(&state, json!({"type": "REORDER_CLIENT", "clientId": "c"}));
    let msgs = a.drain();
    let order: Vec<_> = clients_of(&msgs)
        .unwrap()
        .iter()
        .map(|c| c.client_id.to_string())
        .collect();
    assert_eq!(order, ["c", "a", "b"]);
    assert_eq!(scheduled(&msgs).len(), 1);
}

#[tokio::test]
async fn search_without_provider_reports_error() {
    let state = app();
    let a = join(&state, "a", "Alice");
    a.drain();
    a.send(&state, json!({"type": "SEARCH_MUSIC", "query": "daft punk"}));
    match a.next().await {
        OutgoingMessage::Error(frame) => assert!(frame.message.contains("not configured")),
        other => panic!("expected ERROR, got {:?}", other),
    }
}

#[tokio::test]
async fn stream_appends_source_and_answers_requester() {
    use axum::{Json, Router, routing::get};

    let router = Router::new().route(
        "/stream",
        get(|| async { Json(json!({"url": "https://cdn.example/room-123456/t1.mp3"})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let mut config = Config::default();
    config.provider.base_url = Some(format!("http://{}", addr));
    let state = app_with(config);
    let a = join(&state, "a", "Alice");
    let b = join(&state, "b", "Bob");
    a.drain();
    b.drain();

    a.send(&state, json!({"type": "STREAM_MUSIC", "trackId": "t1"}));
    match a.next().await {
        OutgoingMessage::StreamResponse { track_id, url } => {
            assert_eq!(track_id, "t1");
            assert_eq!(url, "https://cdn.example/room-123456/t1.mp3");
        }
        other => panic!("expected STREAM_RESPONSE, got {:?}", other),
    }
    match b.next().await {
        OutgoingMessage::RoomEvent {
            event: RoomEvent::SetAudioSources { sources },
        } => assert_eq!(sources, [AudioSource::new("https://cdn.example/room-123456/t1.mp3")]),
        other => panic!("expected SET_AUDIO_SOURCES, got {:?}", other),
    }
}

#[tokio::test]
async fn delete_sources_updates_playlist_and_storage() {
    let state = app();
    let a = join(&state, "a", "Alice");
    let store = state.registry.store().clone();
    for name in ["one", "two"] {
        let url = format!("https://cdn.example/room-123456/{}.mp3", name);
        state
            .registry
            .get(&room_id())
            .unwrap()
            .lock()
            .add_audio_source(AudioSource::new(url));
        store
            .put(&format!("room-123456/{}.mp3", name), Bytes::from_static(b"x"))
            .await
            .unwrap();
    }
    a.drain();

    a.send(
        &state,
        json!({"type": "DELETE_AUDIO_SOURCES", "urls": ["https://cdn.example/room-123456/one.mp3"]}),
    );
    match a.drain().as_slice() {
        [OutgoingMessage::RoomEvent {
            event: RoomEvent::SetAudioSources { sources },
        }] => assert_eq!(sources, &[AudioSource::new("https://cdn.example/room-123456/two.mp3")]),
        other => panic!("expected SET_AUDIO_SOURCES, got {:?}", other),
    }

    for _ in 0..50 {
        if store.list("room-123456/").await.unwrap().len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        store.list("room-123456/").await.unwrap(),
        ["room-123456/two.mp3".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn frames_for_vanished_room_are_ignored() {
    let state = app();
    let a = join(&state, "a", "Alice");
    state.registry.remove_client(&room_id(), &"a".into(), None);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(!state.registry.contains(&room_id()));

    a.drain();
    a.send(&state, json!({"type": "PLAY", "trackTimeSeconds": 0, "audioSource": "x.mp3"}));
    assert!(a.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn replaced_connection_is_closed_and_ignored() {
    let state = app();
    let old_a = join(&state, "a", "Alice");
    let b = join(&state, "b", "Bob");
    let new_a = join(&state, "a", "Alice");
    assert!(old_a.rx.try_iter().any(|frame| frame == Outbound::Close));
    b.drain();
    new_a.drain();
    let joined_at = state.registry.get(&room_id()).unwrap().lock().client(&"a".into()).unwrap().last_heartbeat;

    tokio::time::sleep(Duration::from_secs(10)).await;
    old_a.send(&state, json!({"type": "PLAY", "trackTimeSeconds": 0, "audioSource": "x.mp3"}));
    old_a.send(&state, json!({"type": "NTP_REQUEST", "t0": 1}));
    assert!(old_a.drain().is_empty());
    assert!(scheduled(&b.drain()).is_empty());
    assert!(scheduled(&new_a.drain()).is_empty());

    let entry = state.registry.get(&room_id()).unwrap();
    let room = entry.lock();
    assert!(!room.playback().is_playing());
    assert_eq!(room.client(&"a".into()).unwrap().last_heartbeat, joined_at);
}

#[tokio::test]
async fn deleting_a_source_keeps_keys_sharing_its_prefix() {
    let state = app();
    let a = join(&state, "a", "Alice");
    let store = state.registry.store().clone();
    for name in ["t", "t1.mp3"] {
        let url = format!("https://cdn.example/room-123456/{}", name);
        state
            .registry
            .get(&room_id())
            .unwrap()
            .lock()
            .add_audio_source(AudioSource::new(url));
        store
            .put(&format!("room-123456/{}", name), Bytes::from_static(b"x"))
            .await
            .unwrap();
    }
    a.drain();

    a.send(
        &state,
        json!({"type": "DELETE_AUDIO_SOURCES", "urls": ["https://cdn.example/room-123456/t"]}),
    );
    for _ in 0..50 {
        if store.list("room-123456/").await.unwrap().len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        store.list("room-123456/").await.unwrap(),
        ["room-123456/t1.mp3".to_string()]
    );
    assert_eq!(
        state.registry.get(&room_id()).unwrap().lock().audio_sources(),
        &[AudioSource::new("https://cdn.example/room-123456/t1.mp3")]
    );
}
