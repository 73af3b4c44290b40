use proxima_core::{AudioFrame, AudioState, PeerId};

/// Peer lifecycle notifications, fanned out to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Added {
        peer_id: PeerId,
        peer_type: String,
        polite: bool,
    },
    Updated {
        peer_id: PeerId,
        audio_state: AudioState,
    },
    ChannelOpen(PeerId),
    Removed(PeerId),
}

/// Receives decoded audio from open data channels. Frames for a peer are only
/// accepted between `add_peer` and `remove_peer`.
pub trait FrameSink: Send + Sync {
    fn add_peer(&self, peer_id: &PeerId);

    fn push_frame(&self, from: &PeerId, frame: AudioFrame);

    fn remove_peer(&self, peer_id: &PeerId);
}
