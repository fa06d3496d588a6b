pub mod stats;

pub use stats::{get_root, get_stats};
