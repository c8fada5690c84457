//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{MatchCoordinator, MatchRegistry};
use crate::lobby::LobbyStore;
use crate::session::SessionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<MatchRegistry>,
    pub sessions: Arc<SessionHub>,
    pub lobby: Arc<LobbyStore>,
    pub coordinator: MatchCoordinator,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let registry = Arc::new(MatchRegistry::new());
        let sessions = Arc::new(SessionHub::new());
        let lobby = Arc::new(LobbyStore::new());

        // Coordinator shares the registry and hub with the HTTP and WS layers
        let coordinator = MatchCoordinator::new(registry.clone(), sessions.clone());

        Self {
            config,
            registry,
            sessions,
            lobby,
            coordinator,
        }
    }
}
