//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kinds of client request, echoed back in acknowledgements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Auth,
    Ready,
    Move,
    Message,
}

impl MessageKind {
    const TAGS: [(&'static str, MessageKind); 4] = [
        ("AUTH", MessageKind::Auth),
        ("READY", MessageKind::Ready),
        ("MOVE", MessageKind::Move),
        ("MESSAGE", MessageKind::Message),
    ];

    fn from_tag(tag: &str) -> Option<Self> {
        Self::TAGS
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, kind)| *kind)
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMsg {
    /// Must be the first message on a connection
    Auth { token: String },

    /// Toggle this participant's ready flag
    Ready,

    /// Fire at the opponent's board
    Move { x: i64, y: i64 },

    /// Free-form payload forwarded to the opponent untouched
    Message { payload: Value },
}

impl ClientMsg {
    /// Decode one text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingKind)?;
        if MessageKind::from_tag(tag).is_none() {
            return Err(ProtocolError::UnknownKind(tag.to_string()));
        }
        serde_json::from_value(value).map_err(ProtocolError::Malformed)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMsg::Auth { .. } => MessageKind::Auth,
            ClientMsg::Ready => MessageKind::Ready,
            ClientMsg::Move { .. } => MessageKind::Move,
            ClientMsg::Message { .. } => MessageKind::Message,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMsg {
    /// Request accepted
    Ok { kind: MessageKind },

    /// Request rejected
    Invalid { reason: String },

    /// Board snapshot; the opponent board never shows unhit ships
    Board {
        self_board: String,
        opponent_board: String,
    },

    /// It is now the recipient's turn
    Turn { move_number: u32 },

    /// Match is over
    #[serde(rename = "RESULT")]
    GameResult { win: bool },

    /// A shot was resolved (sent to both sides)
    Move {
        player: Uuid,
        x: usize,
        y: usize,
        hit: bool,
    },

    /// The opponent toggled their ready flag
    Ready { user_id: Uuid, ready: bool },

    /// Relayed chat payload
    Message { from: Uuid, payload: Value },

    /// The opponent connected
    UserIn { user_id: Uuid },

    /// The opponent left the game
    UserOut { user_id: Uuid },
}

impl ServerMsg {
    pub fn ok(kind: MessageKind) -> Self {
        Self::Ok { kind }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Inbound frame could not be turned into a [`ClientMsg`]
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Message has no type")]
    MissingKind,

    #[error("Unknown message type: {0}")]
    UnknownKind(String),
}
