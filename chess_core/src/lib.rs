//! Chess rules for live sessions.
//!
//! A thin, owned wrapper over `shakmaty`: legal-move application from
//! `{from, to, promotion}` input, move history, FEN serialization and
//! terminal-condition detection (checkmate, stalemate, draw).

pub mod logic;

pub use logic::board::{MoveInput, Side};
pub use logic::game::{ChessGame, MoveRecord, Terminal};
pub use logic::rules::RulesError;
