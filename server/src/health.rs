use crate::game_manager::AppState;
use axum::{extract::State, Json};
use shared::HealthReport;
use std::sync::Arc;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.health().await)
}

pub async fn index_handler() -> &'static str {
    "Chess session server is running"
}
