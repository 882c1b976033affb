//! Wire protocol between browsers and the game server.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`; event
//! names and payload field names are camelCase and must not change.

use chess_core::{MoveInput, MoveRecord, Side};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base time and increment, both in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeControl {
    pub base_time: u32,
    pub increment: u32,
}

impl TimeControl {
    #[must_use]
    pub const fn new(base_time: u32, increment: u32) -> Self {
        Self {
            base_time,
            increment,
        }
    }

    #[must_use]
    pub fn base_millis(self) -> i64 {
        i64::from(self.base_time) * 1000
    }

    #[must_use]
    pub fn increment_millis(self) -> i64 {
        i64::from(self.increment) * 1000
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.base_time / 60, self.increment)
    }
}

/// Optional public profile shown to opponents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chess_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_url: Option<String>,
}

/// Public snapshot of a participant: id, rating and profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDetails {
    pub id: String,
    pub elo: i32,
    #[serde(flatten)]
    pub profile: PlayerProfile,
}

/// Payload of `registerPlayer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: String,
    pub elo: i32,
    pub time_control: TimeControl,
    #[serde(flatten)]
    pub profile: PlayerProfile,
}

/// A value per side, e.g. player ids by color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BySide<T> {
    pub white: Option<T>,
    pub black: Option<T>,
}

/// Remaining milliseconds per side. `lastMoveTime` is Unix epoch millis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSnapshot {
    pub white: i64,
    pub black: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move_time: Option<u64>,
}

/// Color as announced in `matchFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatColor {
    White,
    Black,
}

impl From<Side> for SeatColor {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Self::White,
            Side::Black => Self::Black,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameEndReason {
    Checkmate,
    Stalemate,
    Draw,
    Resignation,
    Timeout,
    Disconnect,
}

impl GameEndReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkmate => "checkmate",
            Self::Stalemate => "stalemate",
            Self::Draw => "draw",
            Self::Resignation => "resignation",
            Self::Timeout => "timeout",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for GameEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status string sent while a game is in progress.
pub const STATUS_ONGOING: &str = "ongoing";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStarted {
    pub game_id: String,
    pub board: String,
    pub turn: Side,
    pub clock: ClockSnapshot,
    pub status: String,
    pub player_colors: BySide<String>,
    pub player_details: BySide<PlayerDetails>,
}

/// Full session state, sent on every move and on resync/reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game_id: String,
    pub board: String,
    pub history: Vec<String>,
    pub turn: Side,
    pub clock: ClockSnapshot,
    pub last_move: Option<MoveRecord>,
    pub status: String,
    pub player_colors: BySide<String>,
    pub player_details: BySide<PlayerDetails>,
}

/// Client to server commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GameMessage {
    RegisterPlayer(Registration),
    JoinQueue {
        id: String,
    },
    LeaveQueue {
        id: String,
    },
    RespondToMatch {
        id: String,
        game_id: String,
        accept: bool,
    },
    MakeMove {
        id: String,
        game_id: String,
        #[serde(rename = "move")]
        mv: MoveInput,
    },
    Resign {
        id: String,
        game_id: String,
    },
    RequestGameState {
        id: String,
        game_id: String,
    },
    Reconnect {
        id: String,
    },
}

/// Server to client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    PlayerRegistered(PlayerDetails),
    JoinedQueue {
        position: usize,
    },
    LeftQueue,
    MatchFound {
        game_id: String,
        color: SeatColor,
        opponent: PlayerDetails,
        time_control: TimeControl,
    },
    MatchAccepted {
        game_id: String,
    },
    MatchRejected {
        game_id: String,
        rejecting_player_id: String,
    },
    GameStarted(Box<GameStarted>),
    GameState(Box<GameSnapshot>),
    InvalidMove {
        error: String,
    },
    ClockUpdate {
        game_id: String,
        clock: ClockSnapshot,
    },
    GameEnded {
        game_id: String,
        winner: Option<String>,
        reason: GameEndReason,
        board: String,
    },
    PlayerDisconnected {
        game_id: String,
        player_id: String,
    },
    PlayerReconnected {
        game_id: String,
        player_id: String,
    },
    Reconnected {
        id: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub active_games: usize,
    pub queue_length: usize,
    pub average_wait_time: f64,
    pub average_elo_delta: f64,
}
