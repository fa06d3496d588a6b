//! Room coordination: authoritative per-room state, the lifecycle manager
//! that owns it, and the timers that drive it.

pub mod broadcast;
pub mod client;
pub mod playback;
pub mod registry;
pub mod scheduler;
pub mod spatial;
pub mod state;

pub use broadcast::{Inbox, Outbound, Outbox};
pub use client::{CachedClient, Client};
pub use playback::{Coordinator, PlaybackCommand, PlaybackState, PlaybackStatus};
pub use registry::{RoomEntry, RoomRegistry};
pub use scheduler::{Job, RoomScheduler};
pub use spatial::{GainModel, Grid};
pub use state::{Room, SpatialState};
