use dashmap::DashMap;
use shared::{BySide, GameSnapshot, HealthReport, PlayerDetails, ServerMessage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{GameConfig, ServerConfig};

pub mod clock;
pub mod lifecycle;
pub mod matchmaking;
pub mod move_handler;
pub mod players;
pub mod session;
pub mod timers;

pub use matchmaking::Matchmaker;
pub use players::PlayerRegistry;
pub use session::{Connection, GameSession, GameStatus};
use timers::TimerRegistry;

type SessionLock = Arc<Mutex<GameSession>>;

/// Owns every live session, the player-to-session index and the timers that
/// drive sessions forward.
pub struct GameManager {
    pub(crate) games: DashMap<String, SessionLock>,
    pub(crate) player_to_game: DashMap<String, String>,
    pub(crate) timers: TimerRegistry,
    players: Arc<PlayerRegistry>,
    config: GameConfig,
    active: AtomicUsize,
}

impl GameManager {
    pub fn new(players: Arc<PlayerRegistry>, config: GameConfig) -> Self {
        Self {
            games: DashMap::new(),
            player_to_game: DashMap::new(),
            timers: TimerRegistry::new(),
            players,
            config,
            active: AtomicUsize::new(0),
        }
    }

    // Clones the handle out so no map guard is held across an await.
    fn session(&self, game_id: &str) -> Option<SessionLock> {
        self.games.get(game_id).map(|s| Arc::clone(s.value()))
    }

    pub fn contains(&self, game_id: &str) -> bool {
        self.games.contains_key(game_id)
    }

    pub fn game_for_player(&self, player_id: &str) -> Option<String> {
        self.player_to_game.get(player_id).map(|g| g.value().clone())
    }

    pub fn active_games_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Runs `f` against the session under its lock.
    pub async fn inspect<R>(&self, game_id: &str, f: impl FnOnce(&GameSession) -> R) -> Option<R> {
        let lock = self.session(game_id)?;
        let session = lock.lock().await;
        Some(f(&session))
    }

    pub async fn has_unfinished_game(&self, player_id: &str) -> bool {
        let Some(game_id) = self.game_for_player(player_id) else {
            return false;
        };
        self.inspect(&game_id, |s| s.status != GameStatus::Completed)
            .await
            .unwrap_or(false)
    }

    fn broadcast(&self, session: &GameSession, msg: &ServerMessage) {
        for player_id in session.participants() {
            if !self.players.send(player_id, msg.clone()) {
                tracing::debug!(game_id = %session.id, player_id = %player_id, "Participant unreachable");
            }
        }
    }

    fn snapshot(&self, session: &GameSession) -> GameSnapshot {
        GameSnapshot {
            game_id: session.id.clone(),
            board: session.game.fen(),
            history: session.game.san_history(),
            turn: session.game.turn(),
            clock: session.clock.snapshot(),
            last_move: session.game.last_move().cloned(),
            status: session.client_status(),
            player_colors: session.player_colors(),
            player_details: self.player_details(session),
        }
    }

    fn player_details(&self, session: &GameSession) -> BySide<PlayerDetails> {
        BySide {
            white: session.white.as_deref().and_then(|id| self.players.details(id)),
            black: session.black.as_deref().and_then(|id| self.players.details(id)),
        }
    }

    fn broadcast_state(&self, session: &GameSession) {
        let snapshot = self.snapshot(session);
        self.broadcast(session, &ServerMessage::GameState(Box::new(snapshot)));
    }
}

pub struct AppState {
    pub players: Arc<PlayerRegistry>,
    pub games: Arc<GameManager>,
    pub matchmaker: Arc<Matchmaker>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let players = Arc::new(PlayerRegistry::new());
        let games = Arc::new(GameManager::new(Arc::clone(&players), config.game.clone()));
        let matchmaker = Arc::new(Matchmaker::new(
            Arc::clone(&players),
            Arc::clone(&games),
            config.matchmaking.clone(),
        ));
        Self {
            players,
            games,
            matchmaker,
            config,
        }
    }

    /// The player still bound to a closed connection leaves the queue and
    /// is marked disconnected in their session.
    pub async fn handle_socket_closed(&self, connection_id: &str) {
        let Some(player_id) = self.players.release(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "Closed connection had no bound player");
            return;
        };
        tracing::info!(player_id = %player_id, connection_id = %connection_id, "Player connection closed");
        self.matchmaker.leave_queue(&player_id).await;
        self.games.handle_disconnect(&player_id).await;
    }

    pub async fn health(&self) -> HealthReport {
        let (queue_length, average_wait_time, average_elo_delta) = self.matchmaker.stats().await;
        HealthReport {
            status: "healthy".to_string(),
            active_games: self.games.active_games_count(),
            queue_length,
            average_wait_time,
            average_elo_delta,
        }
    }
}
