//! Match coordinator - applies match transitions and delivers their outbox
//!
//! Every operation follows the same shape: resolve the caller's match, lock
//! it, run the synchronous transition, drop the lock, then deliver. Messages
//! for the originating participant go to the originating connection in
//! order; everything else goes through the session hub on a best-effort
//! basis.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::session::{Channel, SessionHub};
use crate::util::time::unix_millis;
use crate::ws::protocol::{MessageKind, ServerMsg};

use super::r#match::{GameMatch, MatchError, MatchId, MoveResolution, Outbox, UserId};
use super::registry::MatchRegistry;

#[derive(Clone)]
pub struct MatchCoordinator {
    registry: Arc<MatchRegistry>,
    sessions: Arc<SessionHub>,
}

impl MatchCoordinator {
    pub fn new(registry: Arc<MatchRegistry>, sessions: Arc<SessionHub>) -> Self {
        Self { registry, sessions }
    }

    /// Run `f` against the caller's match under its lock
    fn with_match<T>(
        &self,
        user_id: UserId,
        f: impl FnOnce(&mut GameMatch) -> Result<T, MatchError>,
    ) -> Result<T, MatchError> {
        let handle = self
            .registry
            .match_for(user_id)
            .ok_or(MatchError::NoMatch(user_id))?;
        let mut game = handle.lock();
        f(&mut *game)
    }

    /// Only the originating connection is awaited; peers never hold up the
    /// caller
    async fn deliver(&self, origin: Option<(UserId, &Channel)>, outbox: Outbox) {
        for delivery in outbox {
            let result = match origin {
                Some((user_id, channel)) if user_id == delivery.to => {
                    channel.send(delivery.msg).await
                }
                _ => self.sessions.send(delivery.to, delivery.msg),
            };
            if let Err(e) = result {
                debug!(user_id = %delivery.to, error = %e, "Dropped notification");
            }
        }
    }

    /// Attach an authenticated connection to its participant's match.
    ///
    /// The binding and everything addressed to the new connection are queued
    /// while the match is locked, so a transition racing the attach either
    /// lands in the snapshot or is delivered to the new connection after the
    /// `OK{AUTH}`.
    pub async fn bind_participant(
        &self,
        user_id: UserId,
        channel: &Channel,
    ) -> Result<MatchId, MatchError> {
        let (match_id, peer_outbox) = self.with_match(user_id, |game| {
            let outbox = game.attach(user_id)?;
            queue_or_log(channel, ServerMsg::ok(MessageKind::Auth));
            self.sessions.bind(user_id, channel.clone());

            let (own, peer): (Outbox, Outbox) =
                outbox.into_iter().partition(|d| d.to == user_id);
            for delivery in own {
                queue_or_log(channel, delivery.msg);
            }
            Ok((game.id(), peer))
        })?;

        info!(user_id = %user_id, match_id = %match_id, "Participant bound to match");
        self.deliver(None, peer_outbox).await;
        Ok(match_id)
    }

    pub async fn toggle_ready(&self, user_id: UserId, channel: &Channel) -> Result<(), MatchError> {
        let (started, outbox) = self.with_match(user_id, |game| {
            let outbox = game.toggle_ready(user_id)?;
            Ok((game.turn().is_some(), outbox))
        })?;
        if started {
            info!(user_id = %user_id, "Both participants ready, match started");
        }
        self.deliver(Some((user_id, channel)), outbox).await;
        Ok(())
    }

    pub async fn submit_move(
        &self,
        user_id: UserId,
        x: i64,
        y: i64,
        channel: &Channel,
    ) -> Result<(), MatchError> {
        let (match_id, MoveResolution { hit, finished, outbox }) = self.with_match(user_id, |game| {
            let resolution = game.submit_move(user_id, x, y)?;
            Ok((game.id(), resolution))
        })?;

        debug!(user_id = %user_id, match_id = %match_id, x, y, hit, "Move resolved");
        if finished {
            info!(match_id = %match_id, winner = %user_id, "Match finished");
        }
        self.deliver(Some((user_id, channel)), outbox).await;
        Ok(())
    }

    pub async fn relay_message(&self, user_id: UserId, payload: Value, channel: &Channel) -> Result<(), MatchError> {
        let outbox = self.with_match(user_id, |game| game.relay(user_id, payload))?;
        self.deliver(Some((user_id, channel)), outbox).await;
        Ok(())
    }

    /// Tear down the participant's match after they left the game record
    pub async fn leave(&self, user_id: UserId) -> Result<MatchId, MatchError> {
        let (match_id, outbox) = self.with_match(user_id, |game| {
            let outbox = game.leave(user_id)?;
            Ok((game.id(), outbox))
        })?;
        self.registry.remove(&match_id);
        info!(user_id = %user_id, match_id = %match_id, "Participant left, match removed");
        self.deliver(None, outbox).await;
        Ok(match_id)
    }

    /// Remove stale matches according to the reaper settings
    pub fn reap(&self, idle_timeout: std::time::Duration, finished_ttl: std::time::Duration) -> Vec<MatchId> {
        self.registry.reap(unix_millis(), idle_timeout, finished_ttl)
    }
}

/// Queue on a connection without waiting; used while a match is locked
fn queue_or_log(channel: &Channel, msg: ServerMsg) {
    if let Err(e) = channel.try_send(msg) {
        debug!(
            connection_id = %channel.id(),
            error = %e,
            "Dropped message for new connection"
        );
    }
}
