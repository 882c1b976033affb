use crate::logic::board::MoveInput;
use shakmaty::{uci::UciMove, CastlingSide, Chess, Move, Position, Rank, Role, Square};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    #[error("invalid square: {0}")]
    InvalidSquare(String),

    #[error("invalid promotion piece: {0}")]
    InvalidPromotion(String),

    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// Parses an algebraic square (`"e4"`, case-insensitive).
///
/// # Errors
/// Returns [`RulesError::InvalidSquare`] when the text is not a board square.
pub fn parse_square(text: &str) -> Result<Square, RulesError> {
    text.trim()
        .to_ascii_lowercase()
        .parse::<Square>()
        .map_err(|_| RulesError::InvalidSquare(text.to_string()))
}

/// Parses a promotion piece letter. Only knight, bishop, rook and queen are
/// accepted; an empty string means no promotion.
///
/// # Errors
/// Returns [`RulesError::InvalidPromotion`] for any other letter.
pub fn parse_promotion(text: Option<&str>) -> Result<Option<Role>, RulesError> {
    let Some(raw) = text.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "q" => Ok(Some(Role::Queen)),
        "r" => Ok(Some(Role::Rook)),
        "b" => Ok(Some(Role::Bishop)),
        "n" => Ok(Some(Role::Knight)),
        _ => Err(RulesError::InvalidPromotion(raw.to_string())),
    }
}

/// Resolves client input against the position into a legal move.
///
/// Castling is given as the king's move (`e1g1`). A pawn reaching the last
/// rank without a promotion letter is promoted to a queen.
///
/// # Errors
/// Fails on malformed squares or promotion letters, and with
/// [`RulesError::IllegalMove`] when the move is not legal in `pos`.
pub fn resolve_move(pos: &Chess, input: &MoveInput) -> Result<Move, RulesError> {
    let from = parse_square(&input.from)?;
    let to = parse_square(&input.to)?;
    let promotion = parse_promotion(input.promotion.as_deref())?;

    let illegal = || RulesError::IllegalMove(input.to_string());

    let resolved = UciMove::Normal {
        from,
        to,
        promotion,
    }
    .to_move(pos);

    let m = match resolved {
        Ok(m) => m,
        Err(_) if promotion.is_none() && is_promotion_push(pos, from, to) => UciMove::Normal {
            from,
            to,
            promotion: Some(Role::Queen),
        }
        .to_move(pos)
        .map_err(|_| illegal())?,
        Err(_) => return Err(illegal()),
    };

    if !pos.is_legal(&m) {
        return Err(illegal());
    }
    Ok(m)
}

fn is_promotion_push(pos: &Chess, from: Square, to: Square) -> bool {
    pos.board().role_at(from) == Some(Role::Pawn) && matches!(to.rank(), Rank::First | Rank::Eighth)
}

/// Destination square as a player sees it: for castling that is the king's
/// landing square rather than the rook's.
#[must_use]
pub fn display_target(m: &Move) -> Square {
    match UciMove::from_move(m, shakmaty::CastlingMode::Standard) {
        UciMove::Normal { to, .. } | UciMove::Put { to, .. } => to,
        UciMove::Null => m.to(),
    }
}

/// Single-letter move flags: `n` normal, `b` pawn double push, `e` en
/// passant, `c` capture, `k`/`q` castling, `p` promotion.
#[must_use]
pub fn move_flags(m: &Move) -> String {
    let mut flags = String::new();

    match m.castling_side() {
        Some(CastlingSide::KingSide) => flags.push('k'),
        Some(CastlingSide::QueenSide) => flags.push('q'),
        None => {
            if m.is_en_passant() {
                flags.push('e');
            } else if m.is_capture() {
                flags.push('c');
            } else if is_double_push(m) {
                flags.push('b');
            } else if m.promotion().is_none() {
                flags.push('n');
            }
        }
    }

    if m.promotion().is_some() {
        flags.push('p');
    }
    flags
}

fn is_double_push(m: &Move) -> bool {
    m.role() == Role::Pawn
        && m
            .from()
            .is_some_and(|from| from.file() == m.to().file() && from.distance(m.to()) == 2)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_square() {
        assert_eq!(parse_square("e4").unwrap(), Square::E4);
        assert_eq!(parse_square("H8").unwrap(), Square::H8);
        assert!(matches!(parse_square("i9"), Err(RulesError::InvalidSquare(_))));
        assert!(parse_square("").is_err());
    }

    #[test]
    fn test_parse_promotion() {
        assert_eq!(parse_promotion(None).unwrap(), None);
        assert_eq!(parse_promotion(Some("")).unwrap(), None);
        assert_eq!(parse_promotion(Some("Q")).unwrap(), Some(Role::Queen));
        assert_eq!(parse_promotion(Some("n")).unwrap(), Some(Role::Knight));
        assert!(matches!(
            parse_promotion(Some("k")),
            Err(RulesError::InvalidPromotion(_))
        ));
    }

    #[test]
    fn test_resolve_rejects_illegal() {
        let pos = Chess::default();
        // Pawn cannot move three squares.
        let result = resolve_move(&pos, &MoveInput::new("e2", "e5"));
        assert!(matches!(result, Err(RulesError::IllegalMove(_))));
        // Black piece on white's turn.
        assert!(resolve_move(&pos, &MoveInput::new("e7", "e5")).is_err());
    }

    #[test]
    fn test_flags() {
        let pos = Chess::default();
        let double = resolve_move(&pos, &MoveInput::new("e2", "e4")).unwrap();
        assert_eq!(move_flags(&double), "b");
        let single = resolve_move(&pos, &MoveInput::new("e2", "e3")).unwrap();
        assert_eq!(move_flags(&single), "n");
        let knight = resolve_move(&pos, &MoveInput::new("g1", "f3")).unwrap();
        assert_eq!(move_flags(&knight), "n");
    }
}
