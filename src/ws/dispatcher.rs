//! Per-connection protocol state machine
//!
//! A connection starts unauthenticated and must open with `AUTH`. After that
//! it drives its participant's match. Anything that breaks the protocol gets
//! an `INVALID` and closes the connection; rejected gameplay only gets the
//! `INVALID`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::game::{MatchCoordinator, MatchError, UserId};
use crate::http::middleware::{validate_session_token, AuthError};
use crate::session::{Channel, SessionHub};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, MessageKind, ProtocolError, ServerMsg};

/// What the reader loop should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Unauthenticated,
    Authenticated(UserId),
    Closed,
}

/// Errors that end a connection
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("No match for user {0}")]
    NoMatch(UserId),

    #[error("Unexpected {0:?} message")]
    Unexpected(MessageKind),

    #[error("Binary frames are not supported")]
    BinaryFrame,
}

pub struct Dispatcher {
    state: ConnState,
    channel: Channel,
    coordinator: MatchCoordinator,
    sessions: Arc<SessionHub>,
    jwt_secret: Arc<str>,
    limiter: ConnectionRateLimiter,
}

impl Dispatcher {
    pub fn new(app: &AppState, channel: Channel) -> Self {
        Self {
            state: ConnState::Unauthenticated,
            channel,
            coordinator: app.coordinator.clone(),
            sessions: app.sessions.clone(),
            jwt_secret: Arc::from(app.config.jwt_secret.as_str()),
            limiter: ConnectionRateLimiter::new(),
        }
    }

    /// Authenticated participant, if any
    pub fn user_id(&self) -> Option<UserId> {
        match self.state {
            ConnState::Authenticated(user_id) => Some(user_id),
            _ => None,
        }
    }

    /// Handle one inbound text frame
    pub async fn handle_text(&mut self, text: &str) -> Flow {
        if self.state == ConnState::Closed {
            return Flow::Close;
        }
        if !self.limiter.check() {
            warn!(connection_id = %self.channel.id(), "Rate limited inbound message");
            self.reply(ServerMsg::invalid("rate_limited")).await;
            return Flow::Continue;
        }

        let msg = match ClientMsg::decode(text) {
            Ok(msg) => msg,
            Err(e) => return self.fail(e.into()).await,
        };

        match (self.state, msg) {
            (ConnState::Unauthenticated, ClientMsg::Auth { token }) => {
                self.authenticate(&token).await
            }
            (ConnState::Unauthenticated, other)
            | (ConnState::Authenticated(_), other @ ClientMsg::Auth { .. }) => {
                self.fail(DispatchError::Unexpected(other.kind())).await
            }
            (ConnState::Authenticated(user_id), msg) => {
                if let Err(e) = self.play(user_id, msg).await {
                    debug!(user_id = %user_id, error = %e, "Rejected gameplay request");
                    self.reply(ServerMsg::invalid(e.to_string())).await;
                }
                Flow::Continue
            }
            (ConnState::Closed, _) => Flow::Close,
        }
    }

    /// Binary frames are outside the protocol
    pub async fn handle_binary(&mut self) -> Flow {
        if self.state == ConnState::Closed {
            return Flow::Close;
        }
        self.fail(DispatchError::BinaryFrame).await
    }

    async fn authenticate(&mut self, token: &str) -> Flow {
        let user_id = match validate_session_token(token, &self.jwt_secret) {
            Ok(user_id) => user_id,
            Err(e) => return self.fail(e.into()).await,
        };

        match self.coordinator.bind_participant(user_id, &self.channel).await {
            Ok(match_id) => {
                info!(
                    user_id = %user_id,
                    match_id = %match_id,
                    connection_id = %self.channel.id(),
                    "Connection authenticated"
                );
                self.state = ConnState::Authenticated(user_id);
                Flow::Continue
            }
            Err(_) => self.fail(DispatchError::NoMatch(user_id)).await,
        }
    }

    async fn play(&self, user_id: UserId, msg: ClientMsg) -> Result<(), MatchError> {
        match msg {
            ClientMsg::Ready => self.coordinator.toggle_ready(user_id, &self.channel).await,
            ClientMsg::Move { x, y } => {
                self.coordinator
                    .submit_move(user_id, x, y, &self.channel)
                    .await
            }
            ClientMsg::Message { payload } => {
                self.coordinator
                    .relay_message(user_id, payload, &self.channel)
                    .await
            }
            // Routed to `fail` before reaching here
            ClientMsg::Auth { .. } => Ok(()),
        }
    }

    async fn reply(&self, msg: ServerMsg) {
        if let Err(e) = self.channel.send(msg).await {
            debug!(connection_id = %self.channel.id(), error = %e, "Reply dropped");
        }
    }

    async fn fail(&mut self, error: DispatchError) -> Flow {
        warn!(connection_id = %self.channel.id(), error = %error, "Closing connection");
        self.reply(ServerMsg::invalid(error.to_string())).await;
        if let ConnState::Authenticated(user_id) = self.state {
            self.sessions.release(user_id, self.channel.id());
        }
        self.state = ConnState::Closed;
        Flow::Close
    }

    /// Tear the connection down. The match itself is left for a reconnect.
    pub async fn disconnect(&mut self) {
        if let ConnState::Authenticated(user_id) = self.state {
            if self.sessions.release(user_id, self.channel.id()) {
                debug!(user_id = %user_id, "Session binding released");
            }
        }
        self.state = ConnState::Closed;
        self.channel.close().await;
    }
}
