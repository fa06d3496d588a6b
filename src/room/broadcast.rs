use tracing::warn;

use crate::protocol::{OutgoingMessage, encode};

/// A frame queued for one connection's socket writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    /// Ask the writer to close the socket.
    Close,
}

/// Sending half of a connection's FIFO queue. Frames published to one
/// outbox are written in publish order.
pub type Outbox = flume::Sender<Outbound>;
pub type Inbox = flume::Receiver<Outbound>;

pub fn channel() -> (Outbox, Inbox) {
    flume::unbounded()
}

/// Sends one frame to a single connection.
pub fn reply(outbox: &Outbox, msg: &OutgoingMessage) -> bool {
    match encode(msg) {
        Ok(json) => outbox.send(Outbound::Text(json)).is_ok(),
        Err(e) => {
            warn!("Failed to encode outgoing message: {}", e);
            false
        }
    }
}

/// Fans one frame out to every outbox, serializing it once. Returns how many
/// connections accepted it.
pub fn publish<'a>(outboxes: impl IntoIterator<Item = &'a Outbox>, msg: &OutgoingMessage) -> usize {
    let json = match encode(msg) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode broadcast: {}", e);
            return 0;
        }
    };
    outboxes
        .into_iter()
        .filter(|outbox| outbox.send(Outbound::Text(json.clone())).is_ok())
        .count()
}
