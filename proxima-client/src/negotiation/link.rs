use async_trait::async_trait;
use bytes::Bytes;
use proxima_core::{IceCandidate, IceServerConfig, PeerId, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connectivity phase of one peer link, collapsed from the transport's own states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events a link reports back to the engine.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    CandidateGenerated(PeerId, IceCandidate),
    StateChanged(PeerId, LinkState),
    DataChannelReady(PeerId),
    DataChannelClosed(PeerId),
    Message(PeerId, Bytes),
}

/// A direct media link to one remote peer, carrying one audio data channel.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Creates the audio channel and a local offer.
    async fn create_offer(&self) -> anyhow::Result<SessionDescription>;

    /// Applies a remote offer and returns the local answer.
    async fn accept_offer(&self, offer: SessionDescription) -> anyhow::Result<SessionDescription>;

    async fn accept_answer(&self, answer: SessionDescription) -> anyhow::Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()>;

    async fn send(&self, frame: Bytes) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait LinkFactory: Send + Sync {
    async fn create(
        &self,
        peer_id: &PeerId,
        ice_servers: Vec<IceServerConfig>,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> anyhow::Result<Arc<dyn PeerLink>>;
}
