use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use proxima_client::negotiation::{
    EngineConfig, FrameSink, LinkFactory, NegotiationEngine, PeerLink, TransportEvent,
};
use proxima_core::{AudioFrame, IceCandidate, IceServerConfig, PeerId, SessionDescription};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::fake_relay::RecordingSignaling;
use super::helpers::wait_until;

pub struct FakeLink {
    pub peer_id: PeerId,
    pub events: mpsc::Sender<TransportEvent>,
    pub ice_servers: Vec<IceServerConfig>,
    fail_ice: AtomicBool,
    offers: AtomicUsize,
    candidates: AtomicUsize,
    sent: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeLink {
    pub fn set_fail_ice(&self, fail: bool) {
        self.fail_ice.store(fail, Ordering::SeqCst);
    }

    pub fn offers(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub fn candidates(&self) -> usize {
        self.candidates.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!("offer-for-{}", self.peer_id)))
    }

    async fn accept_offer(&self, _offer: SessionDescription) -> Result<SessionDescription> {
        Ok(SessionDescription::answer(format!("answer-for-{}", self.peer_id)))
    }

    async fn accept_answer(&self, _answer: SessionDescription) -> Result<()> {
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<()> {
        if self.fail_ice.load(Ordering::SeqCst) {
            bail!("remote description not set");
        }
        self.candidates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, _frame: Bytes) -> Result<()> {
        // long enough for a teardown to land mid-send
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLinkFactory {
    links: DashMap<PeerId, Arc<FakeLink>>,
    created: AtomicUsize,
    fail_ice: AtomicBool,
}

impl FakeLinkFactory {
    /// Links created from now on reject ICE candidates.
    pub fn set_fail_ice(&self, fail: bool) {
        self.fail_ice.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn link(&self, peer: &str) -> Option<Arc<FakeLink>> {
        self.links.get(&PeerId::from(peer)).map(|l| l.value().clone())
    }

    pub async fn wait_link(&self, peer: &str) -> Arc<FakeLink> {
        assert!(
            wait_until(|| self.link(peer).is_some()).await,
            "no link created for {peer}"
        );
        self.link(peer).unwrap()
    }
}

#[async_trait]
impl LinkFactory for FakeLinkFactory {
    async fn create(
        &self,
        peer_id: &PeerId,
        ice_servers: Vec<IceServerConfig>,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerLink>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let link = Arc::new(FakeLink {
            peer_id: peer_id.clone(),
            events: event_tx,
            ice_servers,
            fail_ice: AtomicBool::new(self.fail_ice.load(Ordering::SeqCst)),
            offers: AtomicUsize::new(0),
            candidates: AtomicUsize::new(0),
            sent: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        });
        self.links.insert(peer_id.clone(), link.clone());
        Ok(link)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    added: Mutex<Vec<PeerId>>,
    frames: Mutex<Vec<(PeerId, AudioFrame)>>,
    removed: Mutex<Vec<PeerId>>,
}

impl RecordingSink {
    pub fn added(&self) -> Vec<PeerId> {
        self.added.lock().unwrap().clone()
    }

    pub fn frames(&self) -> Vec<(PeerId, AudioFrame)> {
        self.frames.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<PeerId> {
        self.removed.lock().unwrap().clone()
    }
}

impl FrameSink for RecordingSink {
    fn add_peer(&self, peer_id: &PeerId) {
        self.added.lock().unwrap().push(peer_id.clone());
    }

    fn push_frame(&self, from: &PeerId, frame: AudioFrame) {
        self.frames.lock().unwrap().push((from.clone(), frame));
    }

    fn remove_peer(&self, peer_id: &PeerId) {
        self.removed.lock().unwrap().push(peer_id.clone());
    }
}

pub struct EngineHarness {
    pub engine: NegotiationEngine,
    pub signaling: Arc<RecordingSignaling>,
    pub links: Arc<FakeLinkFactory>,
    pub sink: Arc<RecordingSink>,
    pub cancel: CancellationToken,
}

pub fn engine_harness(local: &str) -> EngineHarness {
    let signaling = Arc::new(RecordingSignaling::default());
    let links = Arc::new(FakeLinkFactory::default());
    let sink = Arc::new(RecordingSink::default());
    let cancel = CancellationToken::new();
    let engine = NegotiationEngine::new(
        EngineConfig {
            local_id: PeerId::from(local),
            local_type: "player".to_owned(),
            stun_urls: vec!["stun:stun.test:3478".to_owned()],
            turn_override: None,
        },
        signaling.clone(),
        links.clone(),
        sink.clone(),
        cancel.clone(),
    );
    EngineHarness {
        engine,
        signaling,
        links,
        sink,
        cancel,
    }
}
