pub mod app_state;
pub mod maintenance;

pub use app_state::AppState;
