use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use tracing::{debug, info, warn};

use crate::{
    common::types::{ClientId, RoomId},
    room::{Outbound, broadcast},
    server::AppState,
    ws::{Connection, ops::handle_text},
};

pub async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    room_id: RoomId,
    client_id: ClientId,
    username: String,
) {
    let (tx, rx) = broadcast::channel();
    let conn = Connection {
        room_id,
        client_id,
        outbox: tx,
    };

    info!(
        "WebSocket connected: room={} client={} username={:?}",
        conn.room_id, conn.client_id, username
    );
    state
        .registry
        .add_client(&conn.room_id, conn.client_id.clone(), username, conn.outbox.clone());

    loop {
        tokio::select! {
            Ok(frame) = rx.recv_async() => match frame {
                Outbound::Text(json) => {
                    if let Err(e) = socket.send(Message::Text(json.into())).await {
                        warn!("Socket send error: room={} client={} err={}", conn.room_id, conn.client_id, e);
                        break;
                    }
                }
                Outbound::Close => {
                    debug!("Closing socket: room={} client={}", conn.room_id, conn.client_id);
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket error: room={} client={} err={}", conn.room_id, conn.client_id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let received_at = state.registry.now_ms();
                        handle_text(&state, &conn, text.as_str(), received_at);
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    // a reconnect may already own this client id; only our own entry goes
    state
        .registry
        .remove_client(&conn.room_id, &conn.client_id, Some(&conn.outbox));
    info!(
        "WebSocket closed: room={} client={}",
        conn.room_id, conn.client_id
    );
}
