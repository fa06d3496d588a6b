pub mod common;
pub mod configs;
pub mod protocol;
pub mod provider;
pub mod room;
pub mod server;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod ws;
