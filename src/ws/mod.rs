//! Per-connection WebSocket session: the socket loop and the typed
//! dispatch of inbound frames.

use crate::{
    common::types::{ClientId, RoomId},
    room::Outbox,
};

pub mod handler;
pub mod ops;

#[cfg(test)]
mod tests;

pub use handler::handle_socket;
pub use ops::{handle_op, handle_text};

/// Identity of one live connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub room_id: RoomId,
    pub client_id: ClientId,
    pub outbox: Outbox,
}
