use axum::{
    Json,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::ws;

/// WebSocket upgrade endpoint; each accepted socket becomes one relay connection.
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let relay = state.relay.clone();
    let config = state.websocket.as_ref().clone();

    ws.on_upgrade(move |socket| ws::handle_relay_ws(socket, relay, config))
}

/// Status endpoint - live connection and cursor counts
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.status().await)
}

/// Metrics endpoint - returns detailed relay metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.metrics().snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}
