//! SketchRoom WebSocket Relay Server
//!
//! Accepts WebSocket connections at `/ws`, assigns each client an identity
//! and relays drawing deltas between members of the same room.
//!
//! ## Protocol
//!
//! Messages are JSON text frames:
//! ```json
//! { "type": "create room" }
//! { "type": "join-room", "roomId": "…", "lines": [] }
//! { "type": "leave-room", "roomId": "…" }
//! { "lines": [[0, 0, 10, 10]] }
//! ```
//! The last form, any frame without a control `type`, is forwarded verbatim
//! to every other member of the sender's rooms.

use std::future::Future;
use std::sync::Arc;

use axum::{Router, routing::get};
use sketchroom_core::Relay;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
mod connection;
pub mod error;

pub use config::ServerConfig;
pub use error::{ConfigError, ServerError};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub max_message_size: usize,
}

impl AppState {
    pub fn new(relay: Arc<Relay>, config: &ServerConfig) -> Self {
        Self {
            relay,
            max_message_size: config.max_message_size,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(connection::ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Index page
async fn index() -> &'static str {
    "SketchRoom Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}
