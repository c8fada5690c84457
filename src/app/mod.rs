//! Application wiring

pub mod reaper;
pub mod state;

pub use state::AppState;
