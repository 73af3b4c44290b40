//! Signaling relay: room and instance bookkeeping, envelope fan-out and TURN
//! credential issuance over a websocket, plus read-only HTTP introspection.

pub mod config;
pub mod error;
pub mod http;
pub mod room;
pub mod signaling;
pub mod turn;

pub use config::ServerConfig;
pub use error::JoinError;
pub use room::*;
pub use signaling::*;

use axum::Router;
use axum::routing::get;

pub fn router(service: SignalingService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/connections", get(http::list_connections))
        .route("/rooms", get(http::list_rooms))
        .route("/metrics", get(http::render_metrics))
        .route("/healthz", get(http::healthz))
        .with_state(service)
}
