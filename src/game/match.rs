//! Two-player match state machine
//!
//! `GameMatch` is synchronous and transport-free. Every operation validates
//! against the current phase, mutates state, and returns an [`Outbox`] of
//! messages for the caller to deliver once it has released the match lock.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use uuid::Uuid;

use crate::util::time::unix_millis;
use crate::ws::protocol::{MessageKind, ServerMsg};

use super::board::{Board, BoardError, Cell};

/// Stable participant identifier (token `sub` claim)
pub type UserId = Uuid;

/// Match identifier, shared with the lobby game record
pub type MatchId = Uuid;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Waiting for both participants to ready up
    AwaitingReady,
    /// Boards placed, turns alternating
    InProgress,
    /// One fleet is sunk
    Finished,
}

/// A message addressed to one participant
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: UserId,
    pub msg: ServerMsg,
}

impl Delivery {
    pub fn new(to: UserId, msg: ServerMsg) -> Self {
        Self { to, msg }
    }
}

/// Messages produced by one state transition, in delivery order
pub type Outbox = Vec<Delivery>;

/// Result of a resolved shot
#[derive(Debug, Clone, PartialEq)]
pub struct MoveResolution {
    pub hit: bool,
    pub finished: bool,
    pub outbox: Outbox,
}

/// Recoverable gameplay errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Not allowed while match is {0:?}")]
    InvalidState(MatchPhase),

    #[error("It is not your turn")]
    NotYourTurn,

    #[error("User {0} is not part of this match")]
    NotParticipant(UserId),

    #[error("User {0} has no active match")]
    NoMatch(UserId),

    #[error(transparent)]
    Board(#[from] BoardError),
}

/// Seat index: 0 is the creator, 1 the joiner
type Seat = usize;

const CREATOR: Seat = 0;
const SECOND: Seat = 1;

/// Authoritative state of one two-player match
pub struct GameMatch {
    id: MatchId,
    participants: [UserId; 2],
    ready: [bool; 2],
    /// Real boards, created once both participants are ready
    boards: Option<[Board; 2]>,
    /// What each seat knows about its opponent's board
    views: [Board; 2],
    phase: MatchPhase,
    turn: Option<UserId>,
    move_number: u32,
    winner: Option<UserId>,
    rng: ChaCha8Rng,
    last_activity: u64,
    finished_at: Option<u64>,
}

impl GameMatch {
    pub fn new(id: MatchId, creator: UserId, second: UserId, seed: u64) -> Self {
        Self {
            id,
            participants: [creator, second],
            ready: [false; 2],
            boards: None,
            views: [Board::new(), Board::new()],
            phase: MatchPhase::AwaitingReady,
            turn: None,
            move_number: 0,
            winner: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            last_activity: unix_millis(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn creator(&self) -> UserId {
        self.participants[CREATOR]
    }

    pub fn second(&self) -> UserId {
        self.participants[SECOND]
    }

    pub fn participants(&self) -> [UserId; 2] {
        self.participants
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == MatchPhase::Finished
    }

    /// Participant allowed to move, None outside InProgress
    pub fn turn(&self) -> Option<UserId> {
        self.turn
    }

    pub fn move_number(&self) -> u32 {
        self.move_number
    }

    pub fn winner(&self) -> Option<UserId> {
        self.winner
    }

    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    pub fn finished_at(&self) -> Option<u64> {
        self.finished_at
    }

    /// The other side of the match, None if `user_id` is not a participant
    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        self.seat(user_id).ok().map(|seat| self.participants[1 - seat])
    }

    pub fn is_ready(&self, user_id: UserId) -> bool {
        self.seat(user_id).map(|seat| self.ready[seat]).unwrap_or(false)
    }

    /// The participant's own board, once the match has started
    pub fn board(&self, user_id: UserId) -> Option<&Board> {
        let seat = self.seat(user_id).ok()?;
        self.boards.as_ref().map(|boards| &boards[seat])
    }

    fn seat(&self, user_id: UserId) -> Result<Seat, MatchError> {
        self.participants
            .iter()
            .position(|&p| p == user_id)
            .ok_or(MatchError::NotParticipant(user_id))
    }

    fn touch(&mut self) {
        self.last_activity = unix_millis();
    }

    /// Snapshot for `seat`: own board in full, opponent as far as known
    fn board_snapshot(&self, seat: Seat) -> Option<ServerMsg> {
        let boards = self.boards.as_ref()?;
        Some(ServerMsg::Board {
            self_board: boards[seat].serialize(false),
            opponent_board: self.views[seat].serialize(true),
        })
    }

    /// A participant's connection was authenticated and bound.
    ///
    /// The joiner's arrival is announced to the creator. When the match is
    /// already running the participant gets a fresh snapshot, plus the turn
    /// if it is theirs.
    pub fn attach(&mut self, user_id: UserId) -> Result<Outbox, MatchError> {
        let seat = self.seat(user_id)?;
        self.touch();

        let mut outbox = Outbox::new();
        if seat == SECOND {
            outbox.push(Delivery::new(self.creator(), ServerMsg::UserIn { user_id }));
        }
        if self.phase == MatchPhase::InProgress {
            if let Some(snapshot) = self.board_snapshot(seat) {
                outbox.push(Delivery::new(user_id, snapshot));
            }
            if self.turn == Some(user_id) {
                outbox.push(Delivery::new(
                    user_id,
                    ServerMsg::Turn {
                        move_number: self.move_number,
                    },
                ));
            }
        }
        Ok(outbox)
    }

    /// Flip the participant's ready flag; starts the match once both are set
    pub fn toggle_ready(&mut self, user_id: UserId) -> Result<Outbox, MatchError> {
        let seat = self.seat(user_id)?;
        if self.phase != MatchPhase::AwaitingReady {
            return Err(MatchError::InvalidState(self.phase));
        }
        self.touch();

        self.ready[seat] = !self.ready[seat];
        let other = self.participants[1 - seat];
        let mut outbox = vec![Delivery::new(user_id, ServerMsg::ok(MessageKind::Ready))];

        if self.ready == [true, true] {
            self.start();
            for seat in [CREATOR, SECOND] {
                if let Some(snapshot) = self.board_snapshot(seat) {
                    outbox.push(Delivery::new(self.participants[seat], snapshot));
                }
            }
            outbox.push(Delivery::new(
                self.creator(),
                ServerMsg::Turn {
                    move_number: self.move_number,
                },
            ));
        } else {
            outbox.push(Delivery::new(
                other,
                ServerMsg::Ready {
                    user_id,
                    ready: self.ready[seat],
                },
            ));
        }
        Ok(outbox)
    }

    fn start(&mut self) {
        let boards = [
            Board::populated(&mut self.rng),
            Board::populated(&mut self.rng),
        ];
        self.boards = Some(boards);
        self.turn = Some(self.creator());
        self.move_number = 0;
        self.phase = MatchPhase::InProgress;
    }

    /// Fire at the opponent's board at `(x, y)`
    pub fn submit_move(
        &mut self,
        user_id: UserId,
        x: i64,
        y: i64,
    ) -> Result<MoveResolution, MatchError> {
        let seat = self.seat(user_id)?;
        if self.phase != MatchPhase::InProgress || self.turn != Some(user_id) {
            return Err(MatchError::NotYourTurn);
        }
        let (x, y) = match (usize::try_from(x), usize::try_from(y)) {
            (Ok(x), Ok(y)) => (x, y),
            _ => return Err(BoardError::OutOfBounds { x, y }.into()),
        };
        Board::check_bounds(x, y)?;

        let target = 1 - seat;
        let other = self.participants[target];
        let Some(boards) = self.boards.as_mut() else {
            return Err(MatchError::InvalidState(MatchPhase::InProgress));
        };
        let hit = boards[target].hit(x, y)?;
        let finished = boards[target].is_finished();
        self.views[seat].record(x, y, if hit { Cell::Hit } else { Cell::Miss })?;
        self.touch();

        let result = ServerMsg::Move {
            player: user_id,
            x,
            y,
            hit,
        };
        let mut outbox = vec![
            Delivery::new(user_id, result.clone()),
            Delivery::new(other, result),
        ];

        if finished {
            self.phase = MatchPhase::Finished;
            self.turn = None;
            self.winner = Some(user_id);
            self.finished_at = Some(self.last_activity);
            outbox.push(Delivery::new(user_id, ServerMsg::GameResult { win: true }));
            outbox.push(Delivery::new(other, ServerMsg::GameResult { win: false }));
        } else {
            self.turn = Some(other);
            self.move_number += 1;
            outbox.push(Delivery::new(
                other,
                ServerMsg::Turn {
                    move_number: self.move_number,
                },
            ));
        }

        Ok(MoveResolution {
            hit,
            finished,
            outbox,
        })
    }

    /// Forward a chat payload to the opponent and acknowledge the sender
    pub fn relay(&mut self, user_id: UserId, payload: Value) -> Result<Outbox, MatchError> {
        let seat = self.seat(user_id)?;
        self.touch();
        Ok(vec![
            Delivery::new(
                self.participants[1 - seat],
                ServerMsg::Message {
                    from: user_id,
                    payload,
                },
            ),
            Delivery::new(user_id, ServerMsg::ok(MessageKind::Message)),
        ])
    }

    /// The participant abandoned the game record; tell the other side
    pub fn leave(&mut self, user_id: UserId) -> Result<Outbox, MatchError> {
        let seat = self.seat(user_id)?;
        self.touch();
        Ok(vec![Delivery::new(
            self.participants[1 - seat],
            ServerMsg::UserOut { user_id },
        )])
    }
}
