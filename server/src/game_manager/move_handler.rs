use chess_core::{MoveInput, Terminal};
use shared::GameEndReason;
use std::sync::Arc;
use tokio::time::Instant;

use super::clock::TickOutcome;
use super::session::{GameSession, GameStatus};
use super::timers::TimerKind;
use super::GameManager;
use crate::error::GameError;

impl GameManager {
    /// Applies a move for the player on turn and settles the clock. Nothing
    /// about the session changes when the move is refused, except that a
    /// mover found out of time loses on the spot.
    pub async fn make_move(
        self: &Arc<Self>,
        game_id: &str,
        player_id: &str,
        input: &MoveInput,
    ) -> Result<(), GameError> {
        let lock = self.session(game_id).ok_or(GameError::GameNotFound)?;
        let mut session = lock.lock().await;

        if session.status != GameStatus::Active {
            return Err(GameError::GameNotActive);
        }
        let mover = session.game.turn();
        if session.player(mover) != Some(player_id) {
            tracing::warn!(game_id = %game_id, player_id = %player_id, turn = %mover, "Move out of turn");
            return Err(GameError::NotYourTurn);
        }

        let now = Instant::now();
        let mut clock = session.clock;
        let increment = session.time_control.increment_millis();
        if let TickOutcome::Flagged(side) = clock.apply_move(mover, increment, now) {
            session.clock = clock;
            tracing::info!(game_id = %game_id, player_id = %player_id, "Move arrived after flag fell");
            self.end_session(&mut session, Some(side.opposite()), GameEndReason::Timeout);
            return Err(GameError::TimeExpired);
        }

        let first_move = session.game.history_len() == 0;
        let record = session.game.play(input).map_err(|e| {
            tracing::warn!(game_id = %game_id, player_id = %player_id, mv = %input, error = %e, "Move rejected");
            e
        })?;
        session.clock = clock;
        tracing::debug!(game_id = %game_id, player_id = %player_id, san = %record.san, "Move applied");

        self.settle_position(&mut session, first_move, now);
        Ok(())
    }

    // End-condition detection after an accepted move.
    fn settle_position(self: &Arc<Self>, session: &mut GameSession, first_move: bool, now: Instant) {
        let terminal = session.game.terminal();

        if first_move && terminal.is_some() {
            tracing::warn!(
                game_id = %session.id,
                fen = %session.game.fen(),
                "Terminal position after the first move, holding it back"
            );
            session.suppress_terminal_until = now.checked_add(self.config.first_move_grace);
            self.schedule_grace_rebroadcast(&session.id);
        }

        let held_back = session.suppress_terminal_until.is_some_and(|until| now < until)
            || session.game.history_len() < self.config.terminal_floor_plies;

        match terminal {
            Some(Terminal::Checkmate { winner }) if !held_back => {
                self.end_session(session, Some(winner), GameEndReason::Checkmate);
            }
            Some(Terminal::Stalemate) if !held_back => {
                self.end_session(session, None, GameEndReason::Stalemate);
            }
            Some(Terminal::Draw) if !held_back => {
                self.end_session(session, None, GameEndReason::Draw);
            }
            Some(terminal) => {
                tracing::debug!(game_id = %session.id, ?terminal, plies = session.game.history_len(), "Terminal condition not honoured yet");
                self.broadcast_state(session);
            }
            None => self.broadcast_state(session),
        }
    }

    fn schedule_grace_rebroadcast(self: &Arc<Self>, game_id: &str) {
        let manager = Arc::clone(self);
        let grace = self.config.first_move_grace;
        let id = game_id.to_string();
        self.timers.schedule(game_id, TimerKind::Grace, async move {
            tokio::time::sleep(grace).await;
            let Some(lock) = manager.session(&id) else {
                return;
            };
            let mut session = lock.lock().await;
            if session.status != GameStatus::Active {
                return;
            }
            session.suppress_terminal_until = None;
            manager.broadcast_state(&session);
        });
    }
}
