//! Game lobby

pub mod store;

pub use store::{GameRecord, GameSummary, LobbyError, LobbyStore};
