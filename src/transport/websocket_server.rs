use std::sync::Arc;

use axum::{
    extract::{Query, State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    common::types::{ClientId, RoomId},
    server::AppState,
    ws::handle_socket,
};

/// Identifiers supplied on the upgrade request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinParams {
    pub room_id: Option<String>,
    pub username: Option<String>,
    pub client_id: Option<String>,
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// GET /ws?roomId=..&username=..&clientId=..
pub async fn websocket_handler(
    Query(params): Query<JoinParams>,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(room_id) = params.room_id.as_deref().and_then(RoomId::parse) else {
        warn!("Rejected upgrade: invalid roomId {:?}", params.room_id);
        return Err((StatusCode::BAD_REQUEST, "roomId must be a 6-digit code"));
    };
    let Some(username) = required(params.username.as_deref()).map(str::to_string) else {
        warn!("Rejected upgrade to room {}: missing username", room_id);
        return Err((StatusCode::BAD_REQUEST, "Missing username"));
    };
    let Some(client_id) = required(params.client_id.as_deref()).map(ClientId::from) else {
        warn!("Rejected upgrade to room {}: missing clientId", room_id);
        return Err((StatusCode::BAD_REQUEST, "Missing clientId"));
    };

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, room_id, client_id, username))
        .into_response())
}
