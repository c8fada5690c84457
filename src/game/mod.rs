//! Battleship game modules

pub mod board;
pub mod coordinator;
pub mod r#match;
pub mod registry;

pub use board::{Board, BoardError, Cell};
pub use coordinator::MatchCoordinator;
pub use r#match::{GameMatch, MatchError, MatchId, MatchPhase, UserId};
pub use registry::{MatchHandle, MatchRegistry};
