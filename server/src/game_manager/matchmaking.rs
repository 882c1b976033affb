use chess_core::Side;
use shared::{PlayerDetails, PlayerProfile, SeatColor, ServerMessage, TimeControl};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::session::Player;
use super::{GameManager, PlayerRegistry};
use crate::config::MatchmakingConfig;
use crate::error::GameError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: String,
    pub elo: i32,
    pub time_control: TimeControl,
    pub joined_at: Instant,
    pub profile: PlayerProfile,
}

impl QueueEntry {
    pub fn details(&self) -> PlayerDetails {
        PlayerDetails {
            id: self.id.clone(),
            elo: self.elo,
            profile: self.profile.clone(),
        }
    }
}

impl From<&Player> for QueueEntry {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            elo: player.elo,
            time_control: player.time_control,
            joined_at: player.joined_at,
            profile: player.profile.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pairing {
    pub white: QueueEntry,
    pub black: QueueEntry,
    pub time_control: TimeControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchmakingStat {
    pub wait: Duration,
    pub elo_delta: u32,
    pub time_control: TimeControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Added,
    Replaced,
}

/// Players waiting for an opponent. Pure bookkeeping: the caller supplies
/// the current time and acts on the pairings returned.
pub struct MatchmakingQueue {
    waiting: Vec<QueueEntry>,
    stats: Vec<MatchmakingStat>,
    config: MatchmakingConfig,
}

impl MatchmakingQueue {
    pub const fn new(config: MatchmakingConfig) -> Self {
        Self {
            waiting: Vec::new(),
            stats: Vec::new(),
            config,
        }
    }

    pub fn enqueue(&mut self, entry: QueueEntry) -> Enqueued {
        if let Some(existing) = self.waiting.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry;
            return Enqueued::Replaced;
        }
        self.waiting.push(entry);
        Enqueued::Added
    }

    pub fn dequeue(&mut self, player_id: &str) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|e| e.id != player_id);
        self.waiting.len() != before
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.waiting.iter().any(|e| e.id == player_id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Pairs as many entries as possible, oldest first. An entry that has
    /// waited past the fallback window pairs with the next oldest regardless
    /// of rating.
    pub fn pair_all(&mut self, now: Instant) -> Vec<Pairing> {
        let mut pairings = Vec::new();
        while let Some(pairing) = self.next_pairing(now) {
            pairings.push(pairing);
        }
        pairings
    }

    fn next_pairing(&mut self, now: Instant) -> Option<Pairing> {
        if self.waiting.len() < 2 {
            return None;
        }
        self.waiting.sort_by_key(|e| e.joined_at);

        let (i, j) = self.waiting.iter().enumerate().find_map(|(i, first)| {
            let fallback =
                now.saturating_duration_since(first.joined_at) >= self.config.fallback_window;
            self.waiting
                .iter()
                .enumerate()
                .skip(i + 1)
                .find(|(_, second)| {
                    fallback || first.elo.abs_diff(second.elo) <= self.config.max_rating_gap
                })
                .map(|(j, _)| (i, j))
        })?;

        // j > i, so removing j first keeps i in place.
        let black = self.waiting.remove(j);
        let white = self.waiting.remove(i);

        let stat = MatchmakingStat {
            wait: now.saturating_duration_since(white.joined_at),
            elo_delta: white.elo.abs_diff(black.elo),
            time_control: white.time_control,
        };
        self.stats.push(stat);

        Some(Pairing {
            time_control: white.time_control,
            white,
            black,
        })
    }

    pub fn stats(&self) -> &[MatchmakingStat] {
        &self.stats
    }

    /// Mean wait of paired players in milliseconds; 0 before any pairing.
    pub fn average_wait_time(&self) -> f64 {
        self.mean(|s| s.wait.as_secs_f64() * 1000.0)
    }

    pub fn average_rating_delta(&self) -> f64 {
        self.mean(|s| f64::from(s.elo_delta))
    }

    fn mean(&self, value: impl Fn(&MatchmakingStat) -> f64) -> f64 {
        if self.stats.is_empty() {
            return 0.0;
        }
        let total: f64 = self.stats.iter().map(value).sum();
        #[allow(clippy::cast_precision_loss)]
        let count = self.stats.len() as f64;
        total / count
    }
}

/// Owns the queue and turns its pairings into sessions.
pub struct Matchmaker {
    queue: Mutex<MatchmakingQueue>,
    players: Arc<PlayerRegistry>,
    games: Arc<GameManager>,
    config: MatchmakingConfig,
}

impl Matchmaker {
    pub fn new(
        players: Arc<PlayerRegistry>,
        games: Arc<GameManager>,
        config: MatchmakingConfig,
    ) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new(config.clone())),
            players,
            games,
            config,
        }
    }

    /// Queues a registered player and tries to pair right away. Returns the
    /// queue length afterwards.
    pub async fn join_queue(&self, player_id: &str) -> Result<usize, GameError> {
        let player = self
            .players
            .get(player_id)
            .ok_or(GameError::PlayerNotRegistered)?;
        if self.games.has_unfinished_game(player_id).await {
            tracing::warn!(player_id = %player_id, "Player already in game, not queueing");
            return Err(GameError::AlreadyInGame);
        }

        let (pairings, len) = {
            let mut queue = self.queue.lock().await;
            let pairings = match queue.enqueue(QueueEntry::from(&player)) {
                Enqueued::Added => {
                    tracing::info!(player_id = %player_id, elo = player.elo, "Player joined queue");
                    queue.pair_all(Instant::now())
                }
                Enqueued::Replaced => {
                    tracing::debug!(player_id = %player_id, "Queue entry replaced");
                    Vec::new()
                }
            };
            (pairings, queue.len())
        };

        for pairing in pairings {
            self.start_match(pairing).await;
        }
        Ok(len)
    }

    pub async fn leave_queue(&self, player_id: &str) -> bool {
        let removed = self.queue.lock().await.dequeue(player_id);
        if removed {
            tracing::info!(player_id = %player_id, "Player left queue");
        }
        removed
    }

    /// One sweep over the queue. Returns the number of sessions created.
    pub async fn run_pairing(&self) -> usize {
        let pairings = self.queue.lock().await.pair_all(Instant::now());
        let created = pairings.len();
        for pairing in pairings {
            self.start_match(pairing).await;
        }
        created
    }

    async fn start_match(&self, pairing: Pairing) {
        let game_id = Uuid::new_v4().to_string();
        tracing::info!(
            game_id = %game_id,
            white = %pairing.white.id,
            black = %pairing.black.id,
            elo_delta = pairing.white.elo.abs_diff(pairing.black.elo),
            "Pairing found"
        );

        for (me, opponent, side) in [
            (&pairing.white, &pairing.black, Side::White),
            (&pairing.black, &pairing.white, Side::Black),
        ] {
            self.players.send(
                &me.id,
                ServerMessage::MatchFound {
                    game_id: game_id.clone(),
                    color: SeatColor::from(side),
                    opponent: opponent.details(),
                    time_control: pairing.time_control,
                },
            );
        }

        self.games
            .create_session(
                game_id,
                &pairing.white.id,
                &pairing.black.id,
                pairing.time_control,
            )
            .await;
    }

    /// Returns `(queue length, average wait ms, average rating delta)`.
    pub async fn stats(&self) -> (usize, f64, f64) {
        let queue = self.queue.lock().await;
        (
            queue.len(),
            queue.average_wait_time(),
            queue.average_rating_delta(),
        )
    }

    pub fn spawn_pairing_task(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.pairing_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let created = self.run_pairing().await;
                if created > 0 {
                    tracing::info!(created, "Periodic pairing created sessions");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, elo: i32, joined_at: Instant) -> QueueEntry {
        QueueEntry {
            id: id.to_string(),
            elo,
            time_control: TimeControl::new(300, 0),
            joined_at,
            profile: PlayerProfile::default(),
        }
    }

    fn queue() -> MatchmakingQueue {
        MatchmakingQueue::new(MatchmakingConfig::default())
    }

    #[test]
    fn test_pairs_within_rating_gap() {
        let t0 = Instant::now();
        let mut q = queue();
        q.enqueue(entry("a", 1500, t0));
        q.enqueue(entry("b", 1550, t0 + Duration::from_secs(1)));

        let pairings = q.pair_all(t0 + Duration::from_secs(1));
        assert_eq!(pairings.len(), 1);
        assert_eq!(pairings[0].white.id, "a");
        assert_eq!(pairings[0].black.id, "b");
        assert!(q.is_empty());
        assert_eq!(q.stats()[0].elo_delta, 50);
        assert_eq!(q.stats()[0].wait, Duration::from_secs(1));
    }

    #[test]
    fn test_gap_too_wide_until_fallback() {
        let t0 = Instant::now();
        let mut q = queue();
        q.enqueue(entry("a", 1000, t0));
        q.enqueue(entry("b", 2000, t0));

        assert!(q.pair_all(t0 + Duration::from_secs(59)).is_empty());
        assert_eq!(q.len(), 2);

        let pairings = q.pair_all(t0 + Duration::from_secs(60));
        assert_eq!(pairings.len(), 1);
        assert_eq!(q.average_rating_delta(), 1000.0);
    }

    #[test]
    fn test_gap_boundary_is_inclusive() {
        let t0 = Instant::now();
        let mut q = queue();
        q.enqueue(entry("a", 1200, t0));
        q.enqueue(entry("b", 1600, t0));
        assert_eq!(q.pair_all(t0).len(), 1);
    }

    #[test]
    fn test_oldest_first_and_restart_scan() {
        let t0 = Instant::now();
        let mut q = queue();
        q.enqueue(entry("late-high", 2000, t0 + Duration::from_secs(3)));
        q.enqueue(entry("early-low", 1000, t0));
        q.enqueue(entry("mid-low", 1100, t0 + Duration::from_secs(1)));
        q.enqueue(entry("mid-high", 1900, t0 + Duration::from_secs(2)));

        let pairings = q.pair_all(t0 + Duration::from_secs(5));
        let ids: Vec<(&str, &str)> = pairings
            .iter()
            .map(|p| (p.white.id.as_str(), p.black.id.as_str()))
            .collect();
        assert_eq!(ids, vec![("early-low", "mid-low"), ("mid-high", "late-high")]);
        assert_eq!(q.stats().len(), 2);
    }

    #[test]
    fn test_enqueue_replaces_existing() {
        let t0 = Instant::now();
        let mut q = queue();
        assert_eq!(q.enqueue(entry("a", 1500, t0)), Enqueued::Added);
        assert_eq!(
            q.enqueue(entry("a", 1600, t0 + Duration::from_secs(5))),
            Enqueued::Replaced
        );
        assert_eq!(q.len(), 1);
        assert!(q.contains("a"));
    }

    #[test]
    fn test_dequeue_idempotent() {
        let t0 = Instant::now();
        let mut q = queue();
        q.enqueue(entry("a", 1500, t0));
        assert!(q.dequeue("a"));
        assert!(!q.dequeue("a"));
        assert!(!q.dequeue("never-queued"));
        assert!(q.is_empty());
    }

    #[test]
    fn test_averages_empty() {
        let q = queue();
        assert_eq!(q.average_wait_time(), 0.0);
        assert_eq!(q.average_rating_delta(), 0.0);
    }

    #[test]
    fn test_average_wait_in_millis() {
        let t0 = Instant::now();
        let mut q = queue();
        q.enqueue(entry("a", 1500, t0));
        q.enqueue(entry("b", 1500, t0));
        q.pair_all(t0 + Duration::from_millis(2500));
        assert_eq!(q.average_wait_time(), 2500.0);
    }
}
