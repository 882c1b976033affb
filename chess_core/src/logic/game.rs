use crate::logic::board::{MoveInput, Side};
use crate::logic::rules::{display_target, move_flags, resolve_move, RulesError};
use serde::{Deserialize, Serialize};
use shakmaty::{fen::Fen, san::San, CastlingMode, Chess, EnPassantMode, Position};

/// A terminal condition of the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Checkmate { winner: Side },
    Stalemate,
    /// Insufficient material, fifty-move rule or threefold repetition.
    Draw,
}

/// One applied half-move, in the verbose shape clients already render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub color: Side,
    pub from: String,
    pub to: String,
    pub piece: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
    pub san: String,
    pub flags: String,
}

#[derive(Debug, Clone)]
pub struct ChessGame {
    position: Chess,
    history: Vec<MoveRecord>,
    // Repetition keys of every position reached, the current one included.
    seen: Vec<String>,
}

impl Default for ChessGame {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessGame {
    #[must_use]
    pub fn new() -> Self {
        Self::with_position(Chess::default())
    }

    /// Loads a position from FEN. History starts empty.
    ///
    /// # Errors
    /// Returns [`RulesError::InvalidFen`] when the text does not describe a
    /// legal standard-chess position.
    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|e| RulesError::InvalidFen(format!("{e}")))?;
        let position: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidFen(format!("{e}")))?;
        Ok(Self::with_position(position))
    }

    fn with_position(position: Chess) -> Self {
        let mut game = Self {
            position,
            history: Vec::new(),
            seen: Vec::new(),
        };
        let key = game.repetition_key();
        game.seen.push(key);
        game
    }

    /// Back to the standard starting position with an empty history.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    #[must_use]
    pub fn turn(&self) -> Side {
        self.position.turn().into()
    }

    #[must_use]
    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn last_move(&self) -> Option<&MoveRecord> {
        self.history.last()
    }

    #[must_use]
    pub fn san_history(&self) -> Vec<String> {
        self.history.iter().map(|m| m.san.clone()).collect()
    }

    /// Validates and applies a move. On rejection the position is untouched.
    ///
    /// # Errors
    /// Propagates [`RulesError`] from move resolution.
    pub fn play(&mut self, input: &MoveInput) -> Result<MoveRecord, RulesError> {
        let m = resolve_move(&self.position, input)?;

        let color = self.turn();
        let san = San::from_move(&self.position, &m).to_string();
        let next = self
            .position
            .clone()
            .play(&m)
            .map_err(|_| RulesError::IllegalMove(input.to_string()))?;

        let suffix = if next.is_checkmate() {
            "#"
        } else if next.is_check() {
            "+"
        } else {
            ""
        };

        let record = MoveRecord {
            color,
            from: m.from().map_or_else(String::new, |sq| sq.to_string()),
            to: display_target(&m).to_string(),
            piece: m.role().char().to_string(),
            captured: m.capture().map(|r| r.char().to_string()),
            promotion: m.promotion().map(|r| r.char().to_string()),
            san: format!("{san}{suffix}"),
            flags: move_flags(&m),
        };

        self.position = next;
        self.history.push(record.clone());
        let key = self.repetition_key();
        self.seen.push(key);
        Ok(record)
    }

    #[must_use]
    pub fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }

    #[must_use]
    pub fn is_stalemate(&self) -> bool {
        self.position.is_stalemate()
    }

    #[must_use]
    pub fn is_insufficient_material(&self) -> bool {
        self.position.is_insufficient_material()
    }

    #[must_use]
    pub fn is_fifty_move_draw(&self) -> bool {
        self.position.halfmoves() >= 100
    }

    #[must_use]
    pub fn is_threefold_repetition(&self) -> bool {
        self.seen.last().is_some_and(|current| {
            self.seen.iter().filter(|key| *key == current).count() >= 3
        })
    }

    /// Any drawn condition, stalemate included.
    #[must_use]
    pub fn is_draw(&self) -> bool {
        self.is_stalemate()
            || self.is_insufficient_material()
            || self.is_fifty_move_draw()
            || self.is_threefold_repetition()
    }

    #[must_use]
    pub fn terminal(&self) -> Option<Terminal> {
        if self.is_checkmate() {
            // The side to move is mated.
            Some(Terminal::Checkmate {
                winner: self.turn().opposite(),
            })
        } else if self.is_stalemate() {
            Some(Terminal::Stalemate)
        } else if self.is_draw() {
            Some(Terminal::Draw)
        } else {
            None
        }
    }

    // Placement, side to move, castling rights and en passant square.
    fn repetition_key(&self) -> String {
        self.fen()
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
