use chess_core::{ChessGame, Side};
use shared::{GameEndReason, GameSnapshot, GameStarted, ServerMessage, TimeControl, STATUS_ONGOING};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::Instant;

use super::session::{Connection, GameOutcome, GameSession, GameStatus};
use super::timers::TimerKind;
use super::GameManager;
use crate::error::GameError;

impl GameManager {
    /// Creates a session for a fresh pairing and starts it straight away.
    pub async fn create_session(
        self: &Arc<Self>,
        game_id: String,
        white: &str,
        black: &str,
        time_control: TimeControl,
    ) -> String {
        self.create_session_from(game_id, white, black, time_control, ChessGame::new())
            .await
    }

    pub(crate) async fn create_session_from(
        self: &Arc<Self>,
        game_id: String,
        white: &str,
        black: &str,
        time_control: TimeControl,
        game: ChessGame,
    ) -> String {
        let session = GameSession::new(
            game_id.clone(),
            white,
            black,
            time_control,
            game,
            Instant::now(),
        );
        let lock = Arc::new(tokio::sync::Mutex::new(session));
        self.games.insert(game_id.clone(), Arc::clone(&lock));
        self.player_to_game.insert(white.to_string(), game_id.clone());
        self.player_to_game.insert(black.to_string(), game_id.clone());

        tracing::info!(
            game_id = %game_id,
            white = %white,
            black = %black,
            time_control = %time_control,
            "Session created"
        );

        let mut session = lock.lock().await;
        // A socket can close after pairing but before the index existed.
        let offline: Vec<String> = session
            .participants()
            .filter(|id| !self.players.is_online(id))
            .map(str::to_string)
            .collect();
        for player_id in offline {
            if !session.disconnected.contains_key(&player_id) {
                self.mark_disconnected(&mut session, &player_id);
            }
        }
        self.start_locked(&mut session);
        drop(session);
        game_id
    }

    /// Waiting -> Active. Returns whether the session is now running because
    /// of this call.
    pub async fn start(self: &Arc<Self>, game_id: &str) -> bool {
        let Some(lock) = self.session(game_id) else {
            return false;
        };
        let mut session = lock.lock().await;
        self.start_locked(&mut session)
    }

    fn start_locked(self: &Arc<Self>, session: &mut GameSession) -> bool {
        if session.status != GameStatus::Waiting {
            tracing::debug!(game_id = %session.id, status = ?session.status, "Start ignored");
            return false;
        }
        if session.white.is_none() || session.black.is_none() {
            tracing::warn!(game_id = %session.id, "Start refused, a side is unassigned");
            return false;
        }
        if session.any_side_disconnected() {
            tracing::info!(game_id = %session.id, "Start deferred, a participant is disconnected");
            return false;
        }
        if session.game.terminal().is_some() {
            tracing::warn!(game_id = %session.id, fen = %session.game.fen(), "Terminal start position, resetting");
            session.game.reset();
        }

        session.advance(GameStatus::Active);
        self.active.fetch_add(1, Ordering::SeqCst);
        session.clock.start(Instant::now());
        self.spawn_clock(&session.id);

        let started = GameStarted {
            game_id: session.id.clone(),
            board: session.game.fen(),
            turn: session.game.turn(),
            clock: session.clock.snapshot(),
            status: STATUS_ONGOING.to_string(),
            player_colors: session.player_colors(),
            player_details: self.player_details(session),
        };
        tracing::info!(game_id = %session.id, "Game started");
        self.broadcast(session, &ServerMessage::GameStarted(Box::new(started)));
        true
    }

    pub async fn resign(self: &Arc<Self>, game_id: &str, player_id: &str) -> Result<(), GameError> {
        let lock = self.session(game_id).ok_or(GameError::GameNotFound)?;
        let mut session = lock.lock().await;
        if session.status != GameStatus::Active {
            return Err(GameError::GameNotActive);
        }
        let side = session.side_of(player_id).ok_or(GameError::NotAParticipant)?;

        tracing::info!(game_id = %game_id, player_id = %player_id, "Player resigned");
        self.end_session(&mut session, Some(side.opposite()), GameEndReason::Resignation);
        Ok(())
    }

    /// Completes the session under a lock the caller already holds. Does
    /// nothing if it is already completed.
    pub(crate) fn end_session(
        self: &Arc<Self>,
        session: &mut GameSession,
        winner: Option<Side>,
        reason: GameEndReason,
    ) -> bool {
        let was_active = session.status == GameStatus::Active;
        if !session.advance(GameStatus::Completed) {
            return false;
        }
        if was_active {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }

        self.timers.cancel(&session.id, &TimerKind::Clock);
        self.timers.cancel(&session.id, &TimerKind::Grace);
        let participants: Vec<String> = session.participants().map(str::to_string).collect();
        for player_id in participants {
            self.timers.cancel(&session.id, &TimerKind::Forfeit(player_id));
        }

        session.outcome = Some(GameOutcome { winner, reason });
        session.suppress_terminal_until = None;

        let winner_id = winner.and_then(|side| session.player(side)).map(str::to_string);
        tracing::info!(
            game_id = %session.id,
            winner = ?winner_id,
            reason = %reason,
            plies = session.game.history_len(),
            duration_secs = session.created_at.elapsed().as_secs(),
            "Game ended"
        );
        self.broadcast(
            session,
            &ServerMessage::GameEnded {
                game_id: session.id.clone(),
                winner: winner_id,
                reason,
                board: session.game.fen(),
            },
        );

        self.schedule_removal(&session.id);
        true
    }

    fn schedule_removal(self: &Arc<Self>, game_id: &str) {
        let manager = Arc::clone(self);
        let window = self.config.retention_window;
        let id = game_id.to_string();
        self.timers.schedule(game_id, TimerKind::Retention, async move {
            tokio::time::sleep(window).await;
            manager.remove_session(&id).await;
        });
    }

    pub(crate) async fn remove_session(&self, game_id: &str) -> bool {
        let Some((_, lock)) = self.games.remove(game_id) else {
            return false;
        };
        let session = lock.lock().await;
        for player_id in session.participants() {
            // A newer session may already own the index entry.
            self.player_to_game.remove_if(player_id, |_, g| g == game_id);
        }
        self.timers.clear(game_id);
        tracing::info!(game_id = %game_id, "Session removed");
        true
    }

    pub async fn handle_disconnect(self: &Arc<Self>, player_id: &str) -> bool {
        let Some(game_id) = self.game_for_player(player_id) else {
            return false;
        };
        let Some(lock) = self.session(&game_id) else {
            return false;
        };
        let mut session = lock.lock().await;
        if session.status == GameStatus::Completed || session.side_of(player_id).is_none() {
            return false;
        }

        self.mark_disconnected(&mut session, player_id);
        true
    }

    // Records the disconnect episode and starts its forfeit timer.
    fn mark_disconnected(self: &Arc<Self>, session: &mut GameSession, player_id: &str) {
        let since = Instant::now();
        let game_id = session.id.clone();
        session.disconnected.insert(player_id.to_string(), since);
        tracing::info!(game_id = %game_id, player_id = %player_id, "Participant disconnected");
        self.broadcast(
            session,
            &ServerMessage::PlayerDisconnected {
                game_id: game_id.clone(),
                player_id: player_id.to_string(),
            },
        );

        let manager = Arc::clone(self);
        let window = self.config.forfeit_window;
        let (gid, pid) = (game_id.clone(), player_id.to_string());
        self.timers.schedule(
            &game_id,
            TimerKind::Forfeit(player_id.to_string()),
            async move {
                tokio::time::sleep(window).await;
                manager.on_forfeit_timeout(&gid, &pid, since).await;
            },
        );
    }

    async fn on_forfeit_timeout(self: &Arc<Self>, game_id: &str, player_id: &str, since: Instant) {
        let Some(lock) = self.session(game_id) else {
            return;
        };
        let mut session = lock.lock().await;
        if session.status == GameStatus::Completed {
            return;
        }
        // Only the disconnect episode this timer was started for forfeits.
        if session.disconnected.get(player_id) != Some(&since) {
            return;
        }
        let Some(side) = session.side_of(player_id) else {
            return;
        };
        tracing::info!(game_id = %game_id, player_id = %player_id, "Forfeit window elapsed");
        self.end_session(&mut session, Some(side.opposite()), GameEndReason::Disconnect);
    }

    /// Rebinds the player's connection and brings them back into their
    /// session. Returns the session id.
    pub async fn handle_reconnect(
        self: &Arc<Self>,
        player_id: &str,
        connection: Connection,
    ) -> Result<String, GameError> {
        if !self.players.rebind(player_id, connection) {
            return Err(GameError::PlayerNotRegistered);
        }
        let game_id = self
            .locate_session(player_id)
            .await
            .ok_or(GameError::NoActiveGame)?;
        let lock = self.session(&game_id).ok_or(GameError::GameNotFound)?;
        let mut session = lock.lock().await;

        session.disconnected.remove(player_id);
        self.timers
            .cancel(&game_id, &TimerKind::Forfeit(player_id.to_string()));
        tracing::info!(game_id = %game_id, player_id = %player_id, status = ?session.status, "Participant reconnected");

        if session.status == GameStatus::Waiting {
            self.start_locked(&mut session);
        } else {
            let snapshot = self.snapshot(&session);
            self.players
                .send(player_id, ServerMessage::GameState(Box::new(snapshot)));
        }

        self.broadcast(
            &session,
            &ServerMessage::PlayerReconnected {
                game_id: game_id.clone(),
                player_id: player_id.to_string(),
            },
        );
        Ok(game_id)
    }

    // Index lookup with one repair pass if the entry is missing or stale.
    async fn locate_session(&self, player_id: &str) -> Option<String> {
        if let Some(game_id) = self.game_for_player(player_id).filter(|g| self.contains(g)) {
            return Some(game_id);
        }
        let repaired = self.repair_index(player_id).await?;
        tracing::warn!(player_id = %player_id, game_id = %repaired, "Repaired player index");
        Some(repaired)
    }

    async fn repair_index(&self, player_id: &str) -> Option<String> {
        let sessions: Vec<(String, super::SessionLock)> = self
            .games
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut finished = None;
        for (game_id, lock) in sessions {
            let session = lock.lock().await;
            if session.side_of(player_id).is_none() {
                continue;
            }
            if session.status != GameStatus::Completed {
                self.player_to_game
                    .insert(player_id.to_string(), game_id.clone());
                return Some(game_id);
            }
            if finished.is_none() {
                finished = Some(game_id);
            }
        }

        let game_id = finished?;
        self.player_to_game
            .insert(player_id.to_string(), game_id.clone());
        Some(game_id)
    }

    pub async fn state_snapshot(&self, game_id: &str) -> Result<GameSnapshot, GameError> {
        let lock = self.session(game_id).ok_or(GameError::GameNotFound)?;
        let session = lock.lock().await;
        Ok(self.snapshot(&session))
    }

    /// Reject is announced to both sides; accept is acknowledged by the
    /// caller on the responding connection.
    pub async fn respond_to_match(
        &self,
        game_id: &str,
        player_id: &str,
        accept: bool,
    ) -> Result<(), GameError> {
        let lock = self.session(game_id).ok_or(GameError::GameNotFound)?;
        let session = lock.lock().await;
        if session.side_of(player_id).is_none() {
            return Err(GameError::NotAParticipant);
        }
        if accept {
            tracing::debug!(game_id = %game_id, player_id = %player_id, "Match accepted");
        } else {
            tracing::info!(game_id = %game_id, player_id = %player_id, "Match rejected");
            self.broadcast(
                &session,
                &ServerMessage::MatchRejected {
                    game_id: game_id.to_string(),
                    rejecting_player_id: player_id.to_string(),
                },
            );
        }
        Ok(())
    }
}
