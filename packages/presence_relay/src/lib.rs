//! Presence Relay - real-time cursor and chat relay over WebSockets
//!
//! Every connected client gets a server-assigned identity. Cursor positions
//! are shared with all other clients, chat messages with everyone, and
//! join/leave notices are sent as connections come and go. State lives in
//! memory only and is lost on restart.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use presence_relay::{AppState, Relay, WebSocketConfig, create_router};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let state = AppState {
//!         relay: Arc::new(Relay::new()),
//!         websocket: Arc::new(WebSocketConfig::default()),
//!     };
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3001").await?;
//!     axum::serve(listener, create_router(state)).await
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod router;
pub mod store;
pub mod ws;

pub use broadcast::Broadcaster;
pub use config::{RelayConfig, WebSocketConfig};
pub use error::{DeliveryError, PayloadError};
pub use protocol::{ClientMessage, MessageType, ServerMessage};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use relay::{ConnectionState, Relay, RelayStatus, Session};
pub use router::{MessageRouter, decode};
pub use store::{Cursor, CursorStore};

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state handed to every route. The relay is constructed once by the
/// entry point and injected here.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub websocket: Arc<WebSocketConfig>,
}

/// Routes for the WebSocket endpoint and the read-only diagnostics.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::websocket_handler))
        .route("/ws", get(handlers::websocket_handler))
        .route("/status", get(handlers::status_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
