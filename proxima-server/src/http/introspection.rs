use crate::SignalingService;
use crate::room::RoomView;
use crate::signaling::ConnectionView;
use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

pub async fn list_connections(State(service): State<SignalingService>) -> Json<Vec<ConnectionView>> {
    Json(service.connections())
}

pub async fn list_rooms(State(service): State<SignalingService>) -> Json<Vec<RoomView>> {
    Json(service.rooms())
}

pub async fn render_metrics(State(service): State<SignalingService>) -> Response {
    match service.metrics().render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn healthz() -> &'static str {
    "ok"
}
