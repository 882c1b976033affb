use chess_core::{ChessGame, Side};
use shared::{
    BySide, GameEndReason, PlayerDetails, PlayerProfile, ServerMessage, TimeControl,
    STATUS_ONGOING,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::clock::ClockState;

pub type Tx = mpsc::UnboundedSender<ServerMessage>;

/// Outbound half of one WebSocket connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub tx: Tx,
}

impl Connection {
    pub fn new(id: impl Into<String>, tx: Tx) -> Self {
        Self { id: id.into(), tx }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub elo: i32,
    pub time_control: TimeControl,
    pub profile: PlayerProfile,
    pub joined_at: Instant,
    pub connection: Connection,
    /// Cleared when the bound socket closes, set again on rebind.
    pub online: bool,
}

impl Player {
    pub fn details(&self) -> PlayerDetails {
        PlayerDetails {
            id: self.id.clone(),
            elo: self.elo,
            profile: self.profile.clone(),
        }
    }

    /// Returns false when the connection has already gone away.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.connection.tx.send(msg).is_ok()
    }
}

/// Lifecycle of a session. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GameStatus {
    Waiting,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOutcome {
    pub winner: Option<Side>,
    pub reason: GameEndReason,
}

pub struct GameSession {
    pub id: String,
    pub white: Option<String>,
    pub black: Option<String>,
    pub game: ChessGame,
    pub time_control: TimeControl,
    pub clock: ClockState,
    pub status: GameStatus,
    /// Participants currently without a connection, with the moment they left.
    pub disconnected: HashMap<String, Instant>,
    pub outcome: Option<GameOutcome>,
    pub suppress_terminal_until: Option<Instant>,
    pub created_at: Instant,
}

impl GameSession {
    pub fn new(
        id: String,
        white: &str,
        black: &str,
        time_control: TimeControl,
        game: ChessGame,
        now: Instant,
    ) -> Self {
        Self {
            id,
            white: Some(white.to_string()),
            black: Some(black.to_string()),
            game,
            time_control,
            clock: ClockState::new(time_control, now),
            status: GameStatus::Waiting,
            disconnected: HashMap::new(),
            outcome: None,
            suppress_terminal_until: None,
            created_at: now,
        }
    }

    pub fn player(&self, side: Side) -> Option<&str> {
        match side {
            Side::White => self.white.as_deref(),
            Side::Black => self.black.as_deref(),
        }
    }

    pub fn side_of(&self, player_id: &str) -> Option<Side> {
        if self.white.as_deref() == Some(player_id) {
            Some(Side::White)
        } else if self.black.as_deref() == Some(player_id) {
            Some(Side::Black)
        } else {
            None
        }
    }

    pub fn participants(&self) -> impl Iterator<Item = &str> {
        self.white.as_deref().into_iter().chain(self.black.as_deref())
    }

    pub fn any_side_disconnected(&self) -> bool {
        self.participants().any(|p| self.disconnected.contains_key(p))
    }

    /// Moves the status forward. Returns false (and changes nothing) for a
    /// transition that would go backwards or stay put.
    pub fn advance(&mut self, next: GameStatus) -> bool {
        if next <= self.status {
            return false;
        }
        self.status = next;
        true
    }

    pub fn player_colors(&self) -> BySide<String> {
        BySide {
            white: self.white.clone(),
            black: self.black.clone(),
        }
    }

    /// `"ongoing"` until completion, then the end reason.
    pub fn client_status(&self) -> String {
        match (self.status, self.outcome) {
            (GameStatus::Completed, Some(outcome)) => outcome.reason.as_str().to_string(),
            _ => STATUS_ONGOING.to_string(),
        }
    }
}
