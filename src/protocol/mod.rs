//! JSON wire protocol. Every frame is an object discriminated by `type`.

pub mod events;
pub mod models;
pub mod opcodes;

pub use events::*;
pub use models::*;
pub use opcodes::*;

/// Serializes an outgoing frame.
pub fn encode(msg: &OutgoingMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Parses an inbound frame.
pub fn decode(text: &str) -> Result<IncomingMessage, serde_json::Error> {
    serde_json::from_str(text)
}
