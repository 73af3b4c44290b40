use crate::negotiation::PeerLink;
use proxima_core::{AudioState, PeerId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-peer connection phase. Ordered so that "reached Stable" is a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NegotiationState {
    /// Link not created yet, or the polite side waiting for an offer.
    Idle,
    MakingOffer,
    AwaitingAnswer,
    Stable,
    Closed,
}

/// A remote participant known to the local client.
pub struct Peer {
    pub id: PeerId,
    pub peer_type: String,
    /// The polite side only answers; the impolite side makes the offer.
    pub polite: bool,
    state: Mutex<NegotiationState>,
    audio_state: Mutex<AudioState>,
    link: Mutex<Option<Arc<dyn PeerLink>>>,
    /// Serializes link creation between the init task and early signals.
    pub(crate) link_init: tokio::sync::Mutex<()>,
    channel_open: AtomicBool,
    closed: AtomicBool,
}

/// Point-in-time copy of a [`Peer`] for callers outside the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub peer_type: String,
    pub polite: bool,
    pub state: NegotiationState,
    pub audio_state: AudioState,
    pub channel_open: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Peer {
    pub fn new(id: PeerId, peer_type: String, polite: bool) -> Self {
        Self {
            id,
            peer_type,
            polite,
            state: Mutex::new(NegotiationState::Idle),
            audio_state: Mutex::new(AudioState::default()),
            link: Mutex::new(None),
            link_init: tokio::sync::Mutex::new(()),
            channel_open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> NegotiationState {
        *lock(&self.state)
    }

    /// No-op once the peer is closed.
    pub(crate) fn set_state(&self, next: NegotiationState) {
        let mut state = lock(&self.state);
        if *state != NegotiationState::Closed {
            *state = next;
        }
    }

    pub fn audio_state(&self) -> AudioState {
        *lock(&self.audio_state)
    }

    pub(crate) fn set_audio_state(&self, audio_state: AudioState) {
        *lock(&self.audio_state) = audio_state;
    }

    pub fn link(&self) -> Option<Arc<dyn PeerLink>> {
        lock(&self.link).clone()
    }

    pub(crate) fn set_link(&self, link: Arc<dyn PeerLink>) {
        *lock(&self.link) = Some(link);
    }

    pub(crate) fn take_link(&self) -> Option<Arc<dyn PeerLink>> {
        lock(&self.link).take()
    }

    pub fn is_channel_open(&self) -> bool {
        self.channel_open.load(Ordering::Acquire)
    }

    pub(crate) fn set_channel_open(&self, open: bool) {
        self.channel_open.store(open, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flips the peer to closed. Only the first caller gets `true`.
    pub(crate) fn mark_closed(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        *lock(&self.state) = NegotiationState::Closed;
        self.channel_open.store(false, Ordering::Release);
        true
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id.clone(),
            peer_type: self.peer_type.clone(),
            polite: self.polite,
            state: self.state(),
            audio_state: self.audio_state(),
            channel_open: self.is_channel_open(),
        }
    }
}
