//! In-memory game records that pair a creator with a second participant

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::game::{MatchId, UserId};

/// Records per listing page
pub const PAGE_SIZE: usize = 10;
/// Longest accepted game name, in characters
pub const MAX_NAME_LEN: usize = 200;

/// A game waiting for, or paired with, a second participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub id: MatchId,
    pub name: String,
    /// Hex SHA-256 of the join password
    password: Option<String>,
    pub creator: UserId,
    pub second: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl GameRecord {
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.creator == user_id || self.second == Some(user_id)
    }

    fn password_matches(&self, attempt: Option<&str>) -> bool {
        match (&self.password, attempt) {
            (None, _) => true,
            (Some(digest), Some(attempt)) => *digest == password_digest(attempt),
            (Some(_), None) => false,
        }
    }
}

/// Public listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameSummary {
    pub id: MatchId,
    pub name: String,
    pub with_password: bool,
    pub creator: UserId,
    pub second: Option<UserId>,
}

impl From<&GameRecord> for GameSummary {
    fn from(record: &GameRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            with_password: record.has_password(),
            creator: record.creator,
            second: record.second,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Game {0} not found")]
    NotFound(MatchId),

    #[error("User {0} is already in a game")]
    AlreadyInGame(UserId),

    #[error("Game {0} is full")]
    Full(MatchId),

    #[error("Wrong password")]
    WrongPassword,

    #[error("Game name must be 1 to 200 characters")]
    InvalidName,

    #[error("User {0} is not in a game")]
    NotInGame(UserId),
}

fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Lobby of game records, oldest first
#[derive(Default)]
pub struct LobbyStore {
    records: Mutex<Vec<GameRecord>>,
}

impl LobbyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new game owned by `creator`
    pub fn create(
        &self,
        creator: UserId,
        name: &str,
        password: Option<&str>,
    ) -> Result<GameRecord, LobbyError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(LobbyError::InvalidName);
        }

        let mut records = self.records.lock();
        if records.iter().any(|r| r.involves(creator)) {
            return Err(LobbyError::AlreadyInGame(creator));
        }

        let record = GameRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            password: password.filter(|p| !p.is_empty()).map(password_digest),
            creator,
            second: None,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    /// One page of games, newest first, optionally filtered by name substring.
    /// Pages count from zero.
    pub fn list(&self, page: usize, name: Option<&str>) -> Vec<GameSummary> {
        let needle = name.map(str::to_lowercase).filter(|n| !n.is_empty());
        let records = self.records.lock();
        records
            .iter()
            .rev()
            .filter(|r| match &needle {
                Some(needle) => r.name.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .skip(page.saturating_mul(PAGE_SIZE))
            .take(PAGE_SIZE)
            .map(GameSummary::from)
            .collect()
    }

    /// Take the second seat of game `id`
    pub fn join(
        &self,
        user_id: UserId,
        id: MatchId,
        password: Option<&str>,
    ) -> Result<GameRecord, LobbyError> {
        let mut records = self.records.lock();
        if records.iter().any(|r| r.involves(user_id)) {
            return Err(LobbyError::AlreadyInGame(user_id));
        }

        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(LobbyError::NotFound(id))?;
        if record.second.is_some() {
            return Err(LobbyError::Full(id));
        }
        if !record.password_matches(password) {
            return Err(LobbyError::WrongPassword);
        }

        record.second = Some(user_id);
        Ok(record.clone())
    }

    /// Drop the record the user belongs to, returning it
    pub fn leave(&self, user_id: UserId) -> Result<GameRecord, LobbyError> {
        let mut records = self.records.lock();
        let pos = records
            .iter()
            .position(|r| r.involves(user_id))
            .ok_or(LobbyError::NotInGame(user_id))?;
        Ok(records.remove(pos))
    }

    pub fn record_for(&self, user_id: UserId) -> Option<GameRecord> {
        self.records
            .lock()
            .iter()
            .find(|r| r.involves(user_id))
            .cloned()
    }

    pub fn remove(&self, id: &MatchId) -> Option<GameRecord> {
        let mut records = self.records.lock();
        let pos = records.iter().position(|r| &r.id == id)?;
        Some(records.remove(pos))
    }

    /// Games still waiting for a second participant
    pub fn open_games(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.second.is_none())
            .count()
    }
}
