use crate::error::GameError;
use crate::game_manager::{AppState, Connection};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use shared::{GameMessage, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let connection = Connection::new(uuid::Uuid::new_v4().to_string(), tx);
    tracing::info!(connection_id = %connection.id, "WebSocket connected");

    // Forward queued outbound messages to the socket
    let forward = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let mut limiter = RateLimiter::new(state.config.rate_limit_per_sec);

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<GameMessage>(&text) {
                Ok(game_msg) => {
                    if counts_toward_limit(&game_msg) && !limiter.allow(Instant::now()) {
                        tracing::warn!(connection_id = %connection.id, "Rate limited");
                        reply(&connection, ServerMessage::error("Rate limited"));
                        continue;
                    }
                    dispatch(&state, &connection, game_msg).await;
                }
                Err(e) => {
                    tracing::debug!(connection_id = %connection.id, error = %e, "Unreadable message");
                    reply(&connection, ServerMessage::error("Malformed message"));
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    tracing::info!(connection_id = %connection.id, "WebSocket closed");
    state.handle_socket_closed(&connection.id).await;
    forward.abort();
}

fn reply(connection: &Connection, msg: ServerMessage) {
    if connection.tx.send(msg).is_err() {
        tracing::debug!(connection_id = %connection.id, "Reply dropped, connection closing");
    }
}

const fn counts_toward_limit(msg: &GameMessage) -> bool {
    !matches!(
        msg,
        GameMessage::RegisterPlayer(_) | GameMessage::Reconnect { .. }
    )
}

async fn dispatch(state: &Arc<AppState>, connection: &Connection, msg: GameMessage) {
    match msg {
        GameMessage::RegisterPlayer(registration) => {
            let details = state.players.register(registration, connection.clone());
            reply(connection, ServerMessage::PlayerRegistered(details));
        }
        GameMessage::JoinQueue { id } => match state.matchmaker.join_queue(&id).await {
            Ok(position) => reply(connection, ServerMessage::JoinedQueue { position }),
            Err(e) => reply(connection, ServerMessage::error(e.to_string())),
        },
        GameMessage::LeaveQueue { id } => {
            state.matchmaker.leave_queue(&id).await;
            reply(connection, ServerMessage::LeftQueue);
        }
        GameMessage::RespondToMatch {
            id,
            game_id,
            accept,
        } => {
            let result = state.games.respond_to_match(&game_id, &id, accept).await;
            match result {
                Ok(()) if accept => reply(connection, ServerMessage::MatchAccepted { game_id }),
                Ok(()) => {}
                Err(e) => reply(connection, ServerMessage::error(e.to_string())),
            }
        }
        GameMessage::MakeMove { id, game_id, mv } => {
            let result = if state.players.is_bound(&id, &connection.id) {
                state.games.make_move(&game_id, &id, &mv).await
            } else {
                Err(GameError::ForeignConnection)
            };
            if let Err(e) = result {
                reply(
                    connection,
                    ServerMessage::InvalidMove {
                        error: e.to_string(),
                    },
                );
            }
        }
        GameMessage::Resign { id, game_id } => {
            let result = if state.players.is_bound(&id, &connection.id) {
                state.games.resign(&game_id, &id).await
            } else {
                Err(GameError::ForeignConnection)
            };
            if let Err(e) = result {
                tracing::debug!(game_id = %game_id, player_id = %id, error = %e, "Resign ignored");
            }
        }
        GameMessage::RequestGameState { game_id, .. } => {
            match state.games.state_snapshot(&game_id).await {
                Ok(snapshot) => reply(connection, ServerMessage::GameState(Box::new(snapshot))),
                Err(_) => reply(connection, ServerMessage::error("Game not found")),
            }
        }
        GameMessage::Reconnect { id } => {
            match state.games.handle_reconnect(&id, connection.clone()).await {
                Ok(_) => {}
                Err(GameError::PlayerNotRegistered) => {
                    reply(
                        connection,
                        ServerMessage::error("Player not registered. Please refresh the page."),
                    );
                    return;
                }
                Err(e) => reply(connection, ServerMessage::error(e.to_string())),
            }
            reply(connection, ServerMessage::Reconnected { id });
        }
    }
}

/// Fixed one-second window, counted per connection.
struct RateLimiter {
    max_per_window: u32,
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    fn new(max_per_window: u32) -> Self {
        Self {
            max_per_window,
            count: 0,
            window_start: Instant::now(),
        }
    }

    fn allow(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.count = 0;
        }
        self.count += 1;
        self.count <= self.max_per_window
    }
}
