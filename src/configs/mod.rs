pub mod base;
pub mod logging;
pub mod room;
pub mod server;
pub mod storage;
pub mod sync;

pub use base::*;
pub use logging::*;
pub use room::*;
pub use server::*;
pub use storage::*;
pub use sync::*;
