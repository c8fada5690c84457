//! Registry of live matches

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use super::r#match::{GameMatch, MatchId, UserId};

/// Shared handle to one match. The mutex is the per-match exclusion
/// boundary and must never be held across an `.await`.
pub type MatchHandle = Arc<Mutex<GameMatch>>;

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<MatchId, MatchHandle>,
    by_participant: DashMap<UserId, MatchId>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            by_participant: DashMap::new(),
        }
    }

    /// Create and register a match for a freshly paired game record
    pub fn create(&self, id: MatchId, creator: UserId, second: UserId) -> MatchHandle {
        let seed = rand::random::<u64>();
        self.insert(GameMatch::new(id, creator, second, seed))
    }

    pub fn insert(&self, game: GameMatch) -> MatchHandle {
        let id = game.id();
        for participant in game.participants() {
            self.by_participant.insert(participant, id);
        }
        let handle = Arc::new(Mutex::new(game));
        self.matches.insert(id, handle.clone());
        info!(match_id = %id, "Match registered");
        handle
    }

    pub fn get(&self, id: &MatchId) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    /// The match a participant currently belongs to
    pub fn match_for(&self, user_id: UserId) -> Option<MatchHandle> {
        let id = *self.by_participant.get(&user_id)?;
        self.get(&id)
    }

    pub fn remove(&self, id: &MatchId) -> Option<MatchHandle> {
        let (_, handle) = self.matches.remove(id)?;
        let participants = handle.lock().participants();
        for participant in participants {
            self.by_participant.remove_if(&participant, |_, mid| mid == id);
        }
        Some(handle)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    /// Remove stale matches and return their ids.
    ///
    /// Finished matches go once they have been over for `finished_ttl`.
    /// Unfinished matches go after `idle_timeout` without activity; a zero
    /// timeout keeps them forever.
    pub fn reap(
        &self,
        now_millis: u64,
        idle_timeout: Duration,
        finished_ttl: Duration,
    ) -> Vec<MatchId> {
        let idle_ms = idle_timeout.as_millis() as u64;
        let ttl_ms = finished_ttl.as_millis() as u64;

        let stale: Vec<MatchId> = self
            .matches
            .iter()
            .filter(|entry| {
                let game = entry.value().lock();
                match game.finished_at() {
                    Some(finished) => now_millis.saturating_sub(finished) >= ttl_ms,
                    None => {
                        idle_ms > 0 && now_millis.saturating_sub(game.last_activity()) >= idle_ms
                    }
                }
            })
            .map(|entry| *entry.key())
            .collect();

        for id in &stale {
            self.remove(id);
        }
        stale
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
