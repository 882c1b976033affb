use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

const MAX_FIRST_MOVE_GRACE: Duration = Duration::from_secs(60);

/// Timing knobs for the session state machine and its clock.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub clock_tick: Duration,
    /// How long a disconnected participant has to come back before forfeiting.
    pub forfeit_window: Duration,
    /// How long a completed session stays queryable before removal.
    pub retention_window: Duration,
    pub first_move_grace: Duration,
    /// Terminal conditions are not honoured before this many half-moves.
    pub terminal_floor_plies: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            clock_tick: Duration::from_millis(100),
            forfeit_window: Duration::from_secs(30),
            retention_window: Duration::from_secs(300),
            first_move_grace: Duration::from_millis(100),
            terminal_floor_plies: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchmakingConfig {
    pub max_rating_gap: u32,
    /// After waiting this long an entry pairs with anyone.
    pub fallback_window: Duration,
    pub pairing_interval: Duration,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            max_rating_gap: 400,
            fallback_window: Duration::from_secs(60),
            pairing_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub game: GameConfig,
    pub matchmaking: MatchmakingConfig,
    pub rate_limit_per_sec: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 4000),
            game: GameConfig::default(),
            matchmaking: MatchmakingConfig::default(),
            rate_limit_per_sec: 20,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let host = parse_or(&lookup, "HOST", defaults.bind_addr.ip());
        let port = parse_or(&lookup, "PORT", defaults.bind_addr.port());

        let game = GameConfig {
            clock_tick: nonzero(
                "CLOCK_TICK_MS",
                millis_or(&lookup, "CLOCK_TICK_MS", defaults.game.clock_tick),
                defaults.game.clock_tick,
            ),
            forfeit_window: secs_or(&lookup, "FORFEIT_WINDOW_SECS", defaults.game.forfeit_window),
            retention_window: secs_or(
                &lookup,
                "RETENTION_WINDOW_SECS",
                defaults.game.retention_window,
            ),
            first_move_grace: at_most(
                "FIRST_MOVE_GRACE_MS",
                millis_or(&lookup, "FIRST_MOVE_GRACE_MS", defaults.game.first_move_grace),
                MAX_FIRST_MOVE_GRACE,
                defaults.game.first_move_grace,
            ),
            ..defaults.game
        };

        let matchmaking = MatchmakingConfig {
            max_rating_gap: parse_or(
                &lookup,
                "MAX_RATING_GAP",
                defaults.matchmaking.max_rating_gap,
            ),
            fallback_window: secs_or(
                &lookup,
                "FALLBACK_WINDOW_SECS",
                defaults.matchmaking.fallback_window,
            ),
            pairing_interval: nonzero(
                "PAIRING_INTERVAL_SECS",
                secs_or(
                    &lookup,
                    "PAIRING_INTERVAL_SECS",
                    defaults.matchmaking.pairing_interval,
                ),
                defaults.matchmaking.pairing_interval,
            ),
        };

        Self {
            bind_addr: SocketAddr::new(host, port),
            game,
            matchmaking,
            ..defaults
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(key, value = %raw, "Unparsable config value, using default");
        default
    })
}

fn millis_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    Duration::from_millis(parse_or(lookup, key, duration_millis(default)))
}

fn secs_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_or(lookup, key, default.as_secs()))
}

// Interval periods must be non-zero.
fn nonzero(key: &str, value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        tracing::warn!(key, "Zero period is not allowed, using default");
        return default;
    }
    value
}

fn at_most(key: &str, value: Duration, max: Duration, default: Duration) -> Duration {
    if value > max {
        tracing::warn!(key, value_ms = duration_millis(value), "Config value too large, using default");
        return default;
    }
    value
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
