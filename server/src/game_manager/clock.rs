use chess_core::Side;
use shared::{ClockSnapshot, GameEndReason, ServerMessage, TimeControl};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{Instant, MissedTickBehavior};

use super::timers::TimerKind;
use super::{GameManager, GameStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    Flagged(Side),
}

/// Remaining time per side in milliseconds. Only the side on move is ever
/// charged, and only for whole milliseconds actually elapsed.
#[derive(Debug, Clone, Copy)]
pub struct ClockState {
    white_ms: i64,
    black_ms: i64,
    last_move_at: Instant,
}

impl ClockState {
    pub fn new(time_control: TimeControl, now: Instant) -> Self {
        let base = time_control.base_millis();
        Self {
            white_ms: base,
            black_ms: base,
            last_move_at: now,
        }
    }

    pub const fn remaining(&self, side: Side) -> i64 {
        match side {
            Side::White => self.white_ms,
            Side::Black => self.black_ms,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.last_move_at = now;
    }

    pub fn tick(&mut self, on_move: Side, now: Instant) -> TickOutcome {
        self.charge(on_move, now)
    }

    /// Charges the mover for the time spent on this move, then credits the
    /// increment. A mover whose flag fell is not credited.
    pub fn apply_move(&mut self, mover: Side, increment_ms: i64, now: Instant) -> TickOutcome {
        if let TickOutcome::Flagged(side) = self.charge(mover, now) {
            return TickOutcome::Flagged(side);
        }
        *self.slot_mut(mover) += increment_ms;
        self.last_move_at = now;
        TickOutcome::Running
    }

    fn charge(&mut self, side: Side, now: Instant) -> TickOutcome {
        let elapsed = now.saturating_duration_since(self.last_move_at);
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        // Sub-millisecond remainders stay on the clock for the next charge.
        self.last_move_at += Duration::from_millis(ms);

        let slot = self.slot_mut(side);
        *slot = slot.saturating_sub(i64::try_from(ms).unwrap_or(i64::MAX));
        if *slot <= 0 {
            *slot = 0;
            TickOutcome::Flagged(side)
        } else {
            TickOutcome::Running
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut i64 {
        match side {
            Side::White => &mut self.white_ms,
            Side::Black => &mut self.black_ms,
        }
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        let age = Instant::now().saturating_duration_since(self.last_move_at);
        let last_move_time = SystemTime::now()
            .checked_sub(age)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| u64::try_from(d.as_millis()).ok());
        ClockSnapshot {
            white: self.white_ms,
            black: self.black_ms,
            last_move_time,
        }
    }
}

const MIN_TICK: Duration = Duration::from_millis(1);

impl GameManager {
    pub(crate) fn spawn_clock(self: &Arc<Self>, game_id: &str) {
        let manager = Arc::clone(self);
        let period = self.config.clock_tick.max(MIN_TICK);
        let id = game_id.to_string();

        self.timers.schedule(game_id, TimerKind::Clock, async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !manager.on_clock_tick(&id).await {
                    break;
                }
            }
        });
    }

    /// Returns false once the clock should stop.
    async fn on_clock_tick(self: &Arc<Self>, game_id: &str) -> bool {
        let Some(lock) = self.session(game_id) else {
            return false;
        };
        let mut session = lock.lock().await;
        if session.status != GameStatus::Active {
            return false;
        }

        let on_move = session.game.turn();
        match session.clock.tick(on_move, Instant::now()) {
            TickOutcome::Running => {
                let clock = session.clock.snapshot();
                self.broadcast(
                    &session,
                    &ServerMessage::ClockUpdate {
                        game_id: game_id.to_string(),
                        clock,
                    },
                );
                true
            }
            TickOutcome::Flagged(side) => {
                tracing::info!(game_id = %game_id, side = %side, "Flag fell");
                self.end_session(&mut session, Some(side.opposite()), GameEndReason::Timeout);
                false
            }
        }
    }
}
