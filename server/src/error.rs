use chess_core::RulesError;

/// Reasons a session or queue command is refused. The WebSocket layer turns
/// these into `invalidMove` / `error` frames for the originating connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Game not found")]
    GameNotFound,

    #[error("Player not registered")]
    PlayerNotRegistered,

    #[error("Player is not part of this game")]
    NotAParticipant,

    #[error("Player is not bound to this connection")]
    ForeignConnection,

    #[error("Game is not active")]
    GameNotActive,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid move: {0}")]
    IllegalMove(#[from] RulesError),

    #[error("Time expired")]
    TimeExpired,

    #[error("Player already in an active game")]
    AlreadyInGame,

    #[error("No active game found for this player")]
    NoActiveGame,
}
