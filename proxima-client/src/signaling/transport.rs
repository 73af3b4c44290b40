use crate::ClientError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use proxima_core::{ClientFrame, ServerFrame};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::warn;

/// One duplex relay connection.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: &ClientFrame) -> Result<(), ClientError>;

    /// Next frame from the relay. `None` once the relay closed the stream.
    async fn recv(&mut self) -> Option<Result<ServerFrame, ClientError>>;

    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ClientError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ClientError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Transport(format!("connect to {url}: {e}")))?;
        Ok(Box::new(WsTransport { ws }))
    }
}

pub struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: &ClientFrame) -> Result<(), ClientError> {
        let json = serde_json::to_string(frame).map_err(|e| ClientError::Protocol(e.to_string()))?;
        self.ws
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<ServerFrame, ClientError>> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(text.as_str()) {
                    Ok(frame) => return Some(Ok(frame)),
                    Err(e) => warn!("Ignoring malformed relay frame: {}", e),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(ClientError::Transport(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
