use crate::SignalingService;
use crate::signaling::Session;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use proxima_core::{ClientFrame, JoinRequest, ServerFrame};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long a fresh socket may stay silent before its join frame arrives.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(service): State<SignalingService>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}

async fn handle_socket(socket: WebSocket, service: SignalingService) {
    let (mut sender, mut receiver) = socket.split();

    let req = match tokio::time::timeout(JOIN_TIMEOUT, next_join(&mut receiver)).await {
        Ok(Some(req)) => req,
        Ok(None) => {
            debug!("WebSocket closed before joining");
            return;
        }
        Err(_) => {
            warn!("WebSocket sent no join within {:?}", JOIN_TIMEOUT);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = match service.join(req, tx) {
        Ok(session) => session,
        Err(e) => {
            let frame = ServerFrame::ServerDisconnect {
                reason: e.reason().to_owned(),
            };
            if let Ok(json) = serde_json::to_string(&frame) {
                let _ = sender.send(Message::Text(json.into())).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    info!("New WebSocket session: {}", session.peer_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let service = service.clone();
        let session = session.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => handle_text(&service, &session, text.as_str()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    service.disconnect(&session);
    info!("WebSocket disconnected: {}", session.peer_id);
}

fn handle_text(service: &SignalingService, session: &Session, text: &str) {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Message(envelope)) => service.handle_envelope(session, envelope),
        Ok(ClientFrame::Join(_)) => {
            warn!("Peer {} sent a second join, ignored", session.peer_id);
        }
        Err(e) => warn!("Invalid frame from {}: {}", session.peer_id, e),
    }
}

async fn next_join(receiver: &mut SplitStream<WebSocket>) -> Option<JoinRequest> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(ClientFrame::Join(req)) => return Some(req),
                Ok(ClientFrame::Message(_)) => warn!("Envelope before join, dropped"),
                Err(e) => warn!("Invalid frame before join: {}", e),
            },
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}
