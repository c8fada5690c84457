//! Session hub: at most one live outbound channel per participant
//!
//! Each WebSocket connection owns an mpsc queue drained by its writer task.
//! The hub maps a participant to the sending half of that queue so match
//! notifications can reach them without knowing anything about the socket.

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::UserId;
use crate::ws::protocol::ServerMsg;

/// Identifies one physical connection
pub type ConnectionId = Uuid;

/// Work item for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Encode and send as a text frame
    Message(ServerMsg),
    /// Send a normal-closure close frame and stop
    Close,
}

/// Sending half of a connection's outbound queue
#[derive(Clone, Debug)]
pub struct Channel {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl Channel {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message for this connection, waiting for room
    pub async fn send(&self, msg: ServerMsg) -> Result<(), SessionError> {
        self.tx
            .send(Outbound::Message(msg))
            .await
            .map_err(|_| SessionError::Closed(self.id))
    }

    /// Queue a message only if there is room right now
    pub fn try_send(&self, msg: ServerMsg) -> Result<(), SessionError> {
        self.tx
            .try_send(Outbound::Message(msg))
            .map_err(|e| match e {
                TrySendError::Full(_) => SessionError::Backlogged(self.id),
                TrySendError::Closed(_) => SessionError::Closed(self.id),
            })
    }

    /// Ask the writer to close the socket
    pub async fn close(&self) {
        let _ = self.tx.send(Outbound::Close).await;
    }
}

/// Delivery errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("User {0} is not connected")]
    NotConnected(UserId),

    #[error("Connection {0} is closed")]
    Closed(ConnectionId),

    #[error("Connection {0} is not keeping up")]
    Backlogged(ConnectionId),
}

/// Process-wide participant -> channel bindings
#[derive(Default)]
pub struct SessionHub {
    bindings: DashMap<UserId, Channel>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `channel` to `user_id`, replacing any earlier binding
    pub fn bind(&self, user_id: UserId, channel: Channel) -> ConnectionId {
        let id = channel.id();
        if let Some(previous) = self.bindings.insert(user_id, channel) {
            debug!(user_id = %user_id, replaced = %previous.id(), "Replaced session binding");
        }
        id
    }

    pub fn unbind(&self, user_id: UserId) {
        self.bindings.remove(&user_id);
    }

    /// Unbind only if `user_id` is still bound to `connection_id`. Returns
    /// whether a binding was removed.
    pub fn release(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        self.bindings
            .remove_if(&user_id, |_, channel| channel.id() == connection_id)
            .is_some()
    }

    pub fn is_bound(&self, user_id: UserId) -> bool {
        self.bindings.contains_key(&user_id)
    }

    pub fn connected_count(&self) -> usize {
        self.bindings.len()
    }

    /// Deliver `msg` to whatever connection `user_id` currently has.
    ///
    /// Never waits: a peer whose queue is full misses the message rather
    /// than stalling the caller.
    pub fn send(&self, user_id: UserId, msg: ServerMsg) -> Result<(), SessionError> {
        let channel = self
            .bindings
            .get(&user_id)
            .ok_or(SessionError::NotConnected(user_id))?;
        channel.try_send(msg).map_err(|e| {
            if let SessionError::Backlogged(connection_id) = e {
                warn!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    "Outbound queue full, dropping message"
                );
            }
            SessionError::NotConnected(user_id)
        })
    }
}
