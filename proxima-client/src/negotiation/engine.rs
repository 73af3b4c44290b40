use crate::negotiation::{
    FrameSink, LinkFactory, LinkState, NegotiationState, Peer, PeerEvent, PeerInfo, PeerLink,
    TransportEvent,
};
use crate::signaling::SignalingOutput;
use crate::{ClientConfig, ClientError};
use anyhow::{Context, Result, bail};
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use proxima_core::utils::SERVER_PEER_ID;
use proxima_core::{
    AudioState, IceCandidate, IceServerConfig, Payload, PeerId, PeerSummary, SdpKind,
    SessionDescription, SignalEnvelope, decode_frame,
};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const LINK_EVENT_CAPACITY: usize = 256;
const OBSERVER_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub local_id: PeerId,
    pub local_type: String,
    pub stun_urls: Vec<String>,
    /// Takes precedence over the TURN server handed out by the relay.
    pub turn_override: Option<IceServerConfig>,
}

impl From<&ClientConfig> for EngineConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            local_id: config.peer_id.clone(),
            local_type: config.peer_type.clone(),
            stun_urls: config.stun_urls.clone(),
            turn_override: config.turn_override.clone(),
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    peers: DashMap<PeerId, Arc<Peer>>,
    signaling: Arc<dyn SignalingOutput>,
    factory: Arc<dyn LinkFactory>,
    sink: Arc<dyn FrameSink>,
    relay_turn: RwLock<Option<IceServerConfig>>,
    /// Serializes sdp/ice/update/close handling. `open` never takes it.
    signal_lock: Mutex<()>,
    observers: broadcast::Sender<PeerEvent>,
    cancel: CancellationToken,
}

/// Perfect negotiation over relay envelopes. The relay decides who is polite;
/// only the impolite side ever offers, so offers never collide.
#[derive(Clone)]
pub struct NegotiationEngine {
    inner: Arc<EngineInner>,
}

impl NegotiationEngine {
    pub fn new(
        config: EngineConfig,
        signaling: Arc<dyn SignalingOutput>,
        factory: Arc<dyn LinkFactory>,
        sink: Arc<dyn FrameSink>,
        cancel: CancellationToken,
    ) -> Self {
        let (observers, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                config,
                peers: DashMap::new(),
                signaling,
                factory,
                sink,
                relay_turn: RwLock::new(None),
                signal_lock: Mutex::new(()),
                observers,
                cancel,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.observers.subscribe()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.inner.peers.iter().map(|p| p.info()).collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<PeerInfo> {
        self.lookup(peer_id).map(|p| p.info())
    }

    fn lookup(&self, peer_id: &PeerId) -> Option<Arc<Peer>> {
        self.inner.peers.get(peer_id).map(|p| p.value().clone())
    }

    fn emit(&self, event: PeerEvent) {
        let _ = self.inner.observers.send(event);
    }

    /// STUN servers plus one TURN server, override first.
    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        let mut servers = Vec::new();
        if !self.inner.config.stun_urls.is_empty() {
            servers.push(IceServerConfig {
                urls: self.inner.config.stun_urls.clone(),
                username: None,
                credential: None,
            });
        }
        let turn = match &self.inner.config.turn_override {
            Some(turn) => Some(turn.clone()),
            None => self
                .inner
                .relay_turn
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        servers.extend(turn);
        servers
    }

    pub async fn handle_envelope(&self, envelope: SignalEnvelope) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let SignalEnvelope { from, payload, .. } = envelope;

        if let Payload::Open {
            connections,
            be_polite,
            turn_config,
        } = payload
        {
            self.handle_open(&from, connections, be_polite, turn_config);
            return;
        }

        let _guard = self.inner.signal_lock.lock().await;
        match payload {
            Payload::Sdp { sdp } => self.handle_sdp(&from, sdp).await,
            Payload::Ice { ice } => self.handle_ice(&from, ice).await,
            Payload::Update { connections } => self.handle_update(&from, connections),
            Payload::Close => self.handle_close(&from).await,
            Payload::Open { .. } => {}
        }
    }

    /// Registers every named peer before returning, then negotiates in the background.
    pub fn handle_open(
        &self,
        from: &PeerId,
        connections: Vec<PeerSummary>,
        be_polite: bool,
        turn_config: Option<IceServerConfig>,
    ) {
        if from.as_str() == SERVER_PEER_ID {
            if let Some(turn) = turn_config {
                *self
                    .inner
                    .relay_turn
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(turn);
            }
        }

        for summary in connections {
            if summary.peer_id == self.inner.config.local_id {
                continue;
            }
            let peer = match self.inner.peers.entry(summary.peer_id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Peer {} is already known, open ignored", summary.peer_id);
                    continue;
                }
                Entry::Vacant(slot) => {
                    let peer = Arc::new(Peer::new(
                        summary.peer_id.clone(),
                        summary.peer_type.clone(),
                        be_polite,
                    ));
                    peer.set_audio_state(summary.audio_state);
                    slot.insert(peer.clone());
                    peer
                }
            };

            info!(
                "Peer {} opened ({})",
                peer.id,
                if peer.polite { "polite" } else { "impolite" }
            );
            self.inner.sink.add_peer(&peer.id);
            self.emit(PeerEvent::Added {
                peer_id: peer.id.clone(),
                peer_type: peer.peer_type.clone(),
                polite: peer.polite,
            });

            let engine = self.clone();
            tokio::spawn(async move { engine.init_connection(peer).await });
        }
    }

    async fn init_connection(&self, peer: Arc<Peer>) {
        let result = tokio::select! {
            _ = self.inner.cancel.cancelled() => return,
            result = self.start_negotiation(&peer) => result,
        };
        if let Err(e) = result {
            if peer.is_closed() {
                debug!("Negotiation with {} abandoned: {:#}", peer.id, e);
                return;
            }
            error!("Failed to initialize connection to {}: {:#}", peer.id, e);
            self.teardown(&peer).await;
        }
    }

    async fn start_negotiation(&self, peer: &Arc<Peer>) -> Result<()> {
        let link = self.ensure_link(peer).await?;
        if peer.polite {
            return Ok(());
        }

        peer.set_state(NegotiationState::MakingOffer);
        let offer = link.create_offer().await?;
        if peer.is_closed() {
            return Ok(());
        }
        peer.set_state(NegotiationState::AwaitingAnswer);
        self.inner
            .signaling
            .send_direct(&peer.id, Payload::Sdp { sdp: offer })?;
        debug!("Sent offer to {}", peer.id);
        Ok(())
    }

    async fn ensure_link(&self, peer: &Arc<Peer>) -> Result<Arc<dyn PeerLink>> {
        let _init = peer.link_init.lock().await;
        if let Some(link) = peer.link() {
            return Ok(link);
        }
        if peer.is_closed() {
            bail!("peer {} is closed", peer.id);
        }

        let (event_tx, event_rx) = mpsc::channel(LINK_EVENT_CAPACITY);
        let link = self
            .inner
            .factory
            .create(&peer.id, self.ice_servers(), event_tx)
            .await
            .with_context(|| format!("Failed to create link to {}", peer.id))?;

        peer.set_link(link.clone());
        // lost a race with teardown: whoever takes the link closes it
        if peer.is_closed() {
            if let Some(link) = peer.take_link() {
                let _ = link.close().await;
            }
            bail!("peer {} closed while its link was created", peer.id);
        }

        let engine = self.clone();
        let events_peer = peer.clone();
        tokio::spawn(async move { engine.run_link_events(events_peer, event_rx).await });
        Ok(link)
    }

    async fn run_link_events(&self, peer: Arc<Peer>, mut rx: mpsc::Receiver<TransportEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if peer.is_closed() {
                break;
            }

            match event {
                TransportEvent::CandidateGenerated(_, ice) => {
                    if let Err(e) = self.inner.signaling.send_direct(&peer.id, Payload::Ice { ice }) {
                        debug!("Local ICE candidate for {} not sent: {}", peer.id, e);
                    }
                }
                TransportEvent::StateChanged(_, state) => match state {
                    LinkState::Failed | LinkState::Closed => {
                        info!("Link to {} is {:?}, tearing down", peer.id, state);
                        self.teardown(&peer).await;
                        break;
                    }
                    other => debug!("Link to {} is {:?}", peer.id, other),
                },
                TransportEvent::DataChannelReady(_) => {
                    peer.set_channel_open(true);
                    self.emit(PeerEvent::ChannelOpen(peer.id.clone()));
                }
                TransportEvent::DataChannelClosed(_) => peer.set_channel_open(false),
                TransportEvent::Message(_, data) => match decode_frame(data) {
                    Ok(_) if peer.is_closed() => break,
                    Ok(frame) => self.inner.sink.push_frame(&peer.id, frame),
                    Err(e) => debug!("Dropping frame from {}: {}", peer.id, e),
                },
            }
        }
    }

    async fn handle_sdp(&self, from: &PeerId, sdp: SessionDescription) {
        let Some(peer) = self.lookup(from) else {
            warn!("Dropping sdp from unknown peer {}", from);
            return;
        };
        let result = match sdp.kind {
            SdpKind::Offer => self.answer_offer(&peer, sdp).await,
            SdpKind::Answer => self.apply_answer(&peer, sdp).await,
        };
        if let Err(e) = result {
            if peer.is_closed() {
                return;
            }
            error!("{}", ClientError::negotiation(&peer.id, &e));
            self.teardown(&peer).await;
        }
    }

    async fn answer_offer(&self, peer: &Arc<Peer>, offer: SessionDescription) -> Result<()> {
        if !peer.polite {
            warn!("Ignoring offer from {}: the local side makes the offer", peer.id);
            return Ok(());
        }
        let link = self.ensure_link(peer).await?;
        let answer = link.accept_offer(offer).await?;
        self.inner
            .signaling
            .send_direct(&peer.id, Payload::Sdp { sdp: answer })?;
        peer.set_state(NegotiationState::Stable);
        debug!("Answered offer from {}", peer.id);
        Ok(())
    }

    async fn apply_answer(&self, peer: &Arc<Peer>, answer: SessionDescription) -> Result<()> {
        let state = peer.state();
        if state != NegotiationState::AwaitingAnswer {
            warn!("Unexpected answer from {} in state {:?}", peer.id, state);
            return Ok(());
        }
        let link = peer
            .link()
            .with_context(|| format!("no link to {}", peer.id))?;
        link.accept_answer(answer).await?;
        peer.set_state(NegotiationState::Stable);
        debug!("Negotiation with {} is stable", peer.id);
        Ok(())
    }

    async fn handle_ice(&self, from: &PeerId, ice: IceCandidate) {
        let Some(peer) = self.lookup(from) else {
            warn!("Dropping ICE candidate from unknown peer {}", from);
            return;
        };
        let link = match self.ensure_link(&peer).await {
            Ok(link) => link,
            Err(e) => {
                debug!("No link for ICE candidate from {}: {:#}", peer.id, e);
                return;
            }
        };
        if let Err(e) = link.add_ice_candidate(ice).await {
            if peer.state() == NegotiationState::Stable {
                error!("{}", ClientError::negotiation(&peer.id, &e));
                self.teardown(&peer).await;
            } else {
                // remote description not applied yet
                debug!("Ignoring early ICE candidate from {}: {:#}", peer.id, e);
            }
        }
    }

    fn handle_update(&self, from: &PeerId, connections: Vec<PeerSummary>) {
        let Some(summary) = connections.into_iter().find(|s| &s.peer_id == from) else {
            debug!("Update from {} does not describe its sender", from);
            return;
        };
        let Some(peer) = self.lookup(from) else {
            warn!("Dropping update from unknown peer {}", from);
            return;
        };
        peer.set_audio_state(summary.audio_state);
        self.emit(PeerEvent::Updated {
            peer_id: peer.id.clone(),
            audio_state: summary.audio_state,
        });
    }

    async fn handle_close(&self, from: &PeerId) {
        match self.lookup(from) {
            Some(peer) => {
                self.teardown(&peer).await;
            }
            None => debug!("Close for unknown peer {}", from),
        }
    }

    /// Releases the peer's link and tells observers, exactly once per peer
    /// however many triggers race here.
    async fn teardown(&self, peer: &Arc<Peer>) -> bool {
        if !peer.mark_closed() {
            return false;
        }
        self.inner
            .peers
            .remove_if(&peer.id, |_, current| Arc::ptr_eq(current, peer));

        if let Some(link) = peer.take_link() {
            if let Err(e) = link.close().await {
                debug!("Closing link to {} failed: {:#}", peer.id, e);
            }
        }
        self.inner.sink.remove_peer(&peer.id);
        self.emit(PeerEvent::Removed(peer.id.clone()));
        info!("Peer {} removed", peer.id);
        true
    }

    pub async fn remove_peer(&self, peer_id: &PeerId) -> bool {
        match self.lookup(peer_id) {
            Some(peer) => self.teardown(&peer).await,
            None => false,
        }
    }

    /// Tears down every peer. Used when leaving the room.
    pub async fn close_all(&self) {
        let peers: Vec<Arc<Peer>> = self.inner.peers.iter().map(|p| p.value().clone()).collect();
        for peer in peers {
            self.teardown(&peer).await;
        }
    }

    /// Fire-and-forget send to every peer whose channel is open. Returns how many
    /// sends were started; peers still negotiating are skipped.
    pub fn broadcast_frame(&self, frame: Bytes) -> usize {
        let links: Vec<(PeerId, Arc<dyn PeerLink>)> = self
            .inner
            .peers
            .iter()
            .filter(|p| p.is_channel_open() && !p.is_closed())
            .filter_map(|p| p.link().map(|link| (p.id.clone(), link)))
            .collect();

        let count = links.len();
        for (peer_id, link) in links {
            let frame = frame.clone();
            tokio::spawn(async move {
                if let Err(e) = link.send(frame).await {
                    debug!("Frame to {} dropped: {:#}", peer_id, e);
                }
            });
        }
        count
    }

    /// Publishes the local mic/deafen flags to the room.
    pub fn publish_audio_state(&self, audio_state: AudioState) -> Result<(), ClientError> {
        let mut summary = PeerSummary::new(
            self.inner.config.local_id.clone(),
            self.inner.config.local_type.clone(),
        );
        summary.audio_state = audio_state;
        self.inner.signaling.send_broadcast(Payload::Update {
            connections: vec![summary],
        })
    }
}
