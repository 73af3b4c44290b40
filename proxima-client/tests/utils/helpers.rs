use proxima_client::ClientConfig;
use proxima_core::{IceServerConfig, Payload, PeerId, PeerSummary, SignalEnvelope};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const WAIT_TIMEOUT_MS: u64 = 5000;
const POLL_MS: u64 = 5;

pub fn client_config(peer_id: &str) -> ClientConfig {
    ClientConfig {
        relay_url: "ws://relay.test/ws".to_owned(),
        peer_id: PeerId::from(peer_id),
        stun_urls: Vec::new(),
        ..ClientConfig::default()
    }
}

/// An `open` envelope as the relay would send it to `to`.
pub fn open_envelope(to: &str, peers: &[&str], be_polite: bool) -> SignalEnvelope {
    SignalEnvelope::from_server(
        PeerId::from(to),
        Payload::Open {
            connections: peers
                .iter()
                .map(|p| PeerSummary::new(PeerId::from(*p), "player"))
                .collect(),
            be_polite,
            turn_config: Some(IceServerConfig {
                urls: vec!["turn:turn.test:3478".to_owned()],
                username: Some("1:proxima".to_owned()),
                credential: Some("secret".to_owned()),
            }),
        },
    )
}

pub fn direct(from: &str, to: &str, payload: Payload) -> SignalEnvelope {
    SignalEnvelope::direct(PeerId::from(from), PeerId::from(to), payload)
}

/// Polls `condition` until it holds or the wait times out.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..(WAIT_TIMEOUT_MS / POLL_MS) {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(POLL_MS)).await;
    }
    condition()
}

pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(Duration::from_millis(WAIT_TIMEOUT_MS), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Skips broadcast events until one matches.
pub async fn next_matching<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    mut matches: impl FnMut(&T) -> bool,
) -> Option<T> {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(Duration::from_millis(WAIT_TIMEOUT_MS), wait)
        .await
        .ok()
        .flatten()
}
