use serde::{Deserialize, Serialize};

use crate::{
    common::types::ClientId,
    protocol::{ClientInfo, Location, OutgoingMessage, Position},
    room::broadcast::{self, Outbound, Outbox},
};

/// One connected device.
#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: ClientId,
    pub username: String,
    pub is_admin: bool,
    pub position: Position,
    /// Client-reported averaged round trip, in milliseconds.
    pub rtt: f64,
    /// Server time of the last clock-sync request.
    pub last_heartbeat: f64,
    pub location: Option<Location>,
    outbox: Outbox,
}

impl Client {
    pub fn new(client_id: ClientId, username: String, outbox: Outbox, now_ms: f64) -> Self {
        Self {
            client_id,
            username,
            is_admin: false,
            position: Position::default(),
            rtt: 0.0,
            last_heartbeat: now_ms,
            location: None,
            outbox,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Whether `outbox` belongs to the connection this entry was created for.
    pub fn is_connection(&self, outbox: &Outbox) -> bool {
        self.outbox.same_channel(outbox)
    }

    pub fn send(&self, msg: &OutgoingMessage) -> bool {
        broadcast::reply(&self.outbox, msg)
    }

    pub fn close(&self) {
        let _ = self.outbox.send(Outbound::Close);
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            is_admin: self.is_admin,
            position: self.position,
            rtt: self.rtt,
            last_ntp_response: self.last_heartbeat,
            location: self.location.clone(),
        }
    }
}

/// What a room remembers about a client across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedClient {
    pub is_admin: bool,
}
