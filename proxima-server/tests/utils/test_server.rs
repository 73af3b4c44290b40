use anyhow::Result;
use proxima_server::http::Metrics;
use proxima_server::{ServerConfig, SignalingService, router};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Starts a relay on an ephemeral loopback port.
pub async fn spawn_server(config: ServerConfig) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let service = SignalingService::new(&config, Metrics::new()?);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(service)).await {
            tracing::error!("[TestServer] serve failed: {}", e);
        }
    });

    Ok(addr)
}

/// Minimal HTTP/1.1 GET returning the response body.
pub async fn http_get(addr: SocketAddr, path: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    let text = String::from_utf8_lossy(&raw).into_owned();

    let (head, body) = text
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow::anyhow!("malformed HTTP response"))?;
    anyhow::ensure!(head.starts_with("HTTP/1.1 200"), "unexpected status: {head}");
    Ok(body.to_owned())
}
