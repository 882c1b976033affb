use dashmap::DashMap;
use shared::{PlayerDetails, Registration, ServerMessage};
use tokio::time::Instant;

use super::session::{Connection, Player};

/// Registered players and the connection each is currently reachable on.
/// Entries are replaced on re-registration and never removed.
#[derive(Default)]
pub struct PlayerRegistry {
    players: DashMap<String, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registration: Registration, connection: Connection) -> PlayerDetails {
        let player = Player {
            id: registration.id,
            elo: registration.elo,
            time_control: registration.time_control,
            profile: registration.profile,
            joined_at: Instant::now(),
            connection,
            online: true,
        };
        let details = player.details();
        tracing::info!(
            player_id = %player.id,
            elo = player.elo,
            time_control = %player.time_control,
            connection_id = %player.connection.id,
            "Player registered"
        );
        self.players.insert(player.id.clone(), player);
        details
    }

    /// Points the player at a new connection. False if the id is unknown.
    pub fn rebind(&self, player_id: &str, connection: Connection) -> bool {
        let Some(mut player) = self.players.get_mut(player_id) else {
            return false;
        };
        tracing::info!(player_id = %player_id, connection_id = %connection.id, "Connection rebound");
        player.connection = connection;
        player.online = true;
        true
    }

    pub fn get(&self, player_id: &str) -> Option<Player> {
        self.players.get(player_id).map(|p| p.value().clone())
    }

    pub fn details(&self, player_id: &str) -> Option<PlayerDetails> {
        self.players.get(player_id).map(|p| p.details())
    }

    pub fn send(&self, player_id: &str, msg: ServerMessage) -> bool {
        self.players
            .get(player_id)
            .is_some_and(|player| player.send(msg))
    }

    /// Registered, with a socket that has not closed.
    pub fn is_online(&self, player_id: &str) -> bool {
        self.players
            .get(player_id)
            .is_some_and(|p| p.online && !p.connection.tx.is_closed())
    }

    pub fn is_bound(&self, player_id: &str, connection_id: &str) -> bool {
        self.players
            .get(player_id)
            .is_some_and(|p| p.connection.id == connection_id)
    }

    /// Marks the player whose current connection is `connection_id` offline
    /// and returns their id. A connection that was replaced by a rebind
    /// matches nobody.
    pub fn release(&self, connection_id: &str) -> Option<String> {
        let mut player = self
            .players
            .iter_mut()
            .find(|p| p.connection.id == connection_id)?;
        player.online = false;
        Some(player.key().clone())
    }
}
