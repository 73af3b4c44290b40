use crate::audio::{
    AudioBackend, CapturePipeline, CpalBackend, DeviceHandle, Mixer, ProcessingFactory,
    SampleSource, default_processing,
};
use crate::clock::{Clock, SystemClock};
use crate::negotiation::{
    EngineConfig, LinkFactory, NegotiationEngine, PeerEvent, PeerInfo, WebRtcLinkFactory,
};
use crate::signaling::{
    Connector, DefaultPlatformProbe, PlatformProbe, SignalingClient, SignalingEvent, WsConnector,
};
use crate::volume::{PositionOracle, VolumeUpdater};
use crate::{ClientConfig, ClientError};
use proxima_core::{AudioFrame, AudioState, PeerId, encode_frame};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SESSION_EVENT_CAPACITY: usize = 64;

/// Collaborators a [`VoiceSession`] is built from.
pub struct SessionDeps {
    pub connector: Arc<dyn Connector>,
    pub probe: Arc<dyn PlatformProbe>,
    pub links: Arc<dyn LinkFactory>,
    pub audio: Arc<dyn AudioBackend>,
    pub processing: Arc<dyn ProcessingFactory>,
    pub positions: Arc<dyn PositionOracle>,
    pub clock: Arc<dyn Clock>,
}

impl SessionDeps {
    /// Websocket relay, webrtc links and cpal devices. Only world positions
    /// have to come from the host.
    pub fn with_defaults(positions: Arc<dyn PositionOracle>) -> Self {
        Self {
            connector: Arc::new(WsConnector),
            probe: Arc::new(DefaultPlatformProbe),
            links: Arc::new(WebRtcLinkFactory),
            audio: Arc::new(CpalBackend),
            processing: default_processing(),
            positions,
            clock: Arc::new(SystemClock),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Peer(PeerEvent),
    Ready,
    /// The relay connection dropped. `None` after a local leave.
    Disconnected(Option<ClientError>),
    Error(ClientError),
}

struct ActiveRoom {
    cancel: CancellationToken,
    engine: NegotiationEngine,
    tasks: Vec<JoinHandle<()>>,
    output: Option<Box<dyn DeviceHandle>>,
}

/// A voice chat participant: relay connection, peer links, microphone and
/// speakers wired together.
pub struct VoiceSession {
    config: ClientConfig,
    signaling: SignalingClient,
    signaling_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<SignalingEvent>>>,
    capture_rx: Arc<AsyncMutex<mpsc::Receiver<AudioFrame>>>,
    links: Arc<dyn LinkFactory>,
    audio: Arc<dyn AudioBackend>,
    positions: Arc<dyn PositionOracle>,
    clock: Arc<dyn Clock>,
    mixer: Arc<Mixer>,
    capture: Arc<CapturePipeline>,
    active: AsyncMutex<Option<ActiveRoom>>,
    engine: Mutex<Option<NegotiationEngine>>,
    audio_state: Mutex<AudioState>,
    loopback: Mutex<bool>,
    events: broadcast::Sender<SessionEvent>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl VoiceSession {
    pub fn new(config: ClientConfig, deps: SessionDeps) -> Self {
        let (signaling_tx, signaling_rx) = mpsc::unbounded_channel();
        let signaling = SignalingClient::new(config.clone(), deps.connector, deps.probe, signaling_tx);

        let (capture_tx, capture_rx) = mpsc::channel(config.audio.capture_queue.max(1));
        let capture = Arc::new(CapturePipeline::new(
            config.audio.clone(),
            deps.audio.clone(),
            deps.processing.clone(),
            capture_tx,
        ));
        let mixer = Arc::new(Mixer::new(
            config.audio.clone(),
            deps.clock.clone(),
            deps.processing,
        ));
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        Self {
            config,
            signaling,
            signaling_rx: Arc::new(AsyncMutex::new(signaling_rx)),
            capture_rx: Arc::new(AsyncMutex::new(capture_rx)),
            links: deps.links,
            audio: deps.audio,
            positions: deps.positions,
            clock: deps.clock,
            mixer,
            capture,
            active: AsyncMutex::new(None),
            engine: Mutex::new(None),
            audio_state: Mutex::new(AudioState::default()),
            loopback: Mutex::new(false),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn local_id(&self) -> &PeerId {
        &self.config.peer_id
    }

    pub fn input_devices(&self) -> Vec<String> {
        self.audio.input_devices()
    }

    pub fn output_devices(&self) -> Vec<String> {
        self.audio.output_devices()
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Opens the output device and connects to `room`. `hints` names peers the
    /// caller believes share its instance.
    pub async fn join(&self, room: &str, password: &str, hints: Vec<PeerId>) -> Result<(), ClientError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let source: Arc<dyn SampleSource> = self.mixer.clone();
        let output = self.audio.open_output(self.config.audio.output_device, source)?;

        let cancel = match self.signaling.connect(room, password, hints) {
            Ok(cancel) => cancel,
            Err(e) => {
                close_device(output).await;
                return Err(e);
            }
        };

        let engine = NegotiationEngine::new(
            EngineConfig::from(&self.config),
            Arc::new(self.signaling.clone()),
            self.links.clone(),
            self.mixer.clone(),
            cancel.clone(),
        );

        let mut tasks = Vec::with_capacity(4);
        tasks.push(tokio::spawn(dispatch_signaling(
            self.signaling_rx.clone(),
            engine.clone(),
            self.events.clone(),
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(forward_peer_events(
            engine.subscribe(),
            self.events.clone(),
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(send_captured_frames(
            self.capture_rx.clone(),
            self.capture.clone(),
            self.mixer.clone(),
            engine.clone(),
            cancel.clone(),
        )));
        let updater = VolumeUpdater::new(
            &self.config.volume,
            self.positions.clone(),
            engine.clone(),
            self.mixer.clone(),
            self.clock.clone(),
        );
        tasks.push(tokio::spawn(updater.run(cancel.clone())));

        *lock(&self.engine) = Some(engine.clone());
        *active = Some(ActiveRoom {
            cancel,
            engine,
            tasks,
            output: Some(output),
        });
        info!("Joining room '{}' as {}", room, self.config.peer_id);
        Ok(())
    }

    /// Leaves the room: cancels in-flight work, tears down every peer and
    /// releases both audio devices. A no-op when not in a room.
    pub async fn leave(&self) {
        let Some(mut room) = self.active.lock().await.take() else {
            return;
        };
        *lock(&self.engine) = None;

        room.cancel.cancel();
        self.signaling.disconnect().await;
        room.engine.close_all().await;
        for task in room.tasks.drain(..) {
            let _ = task.await;
        }
        {
            // events the finished connection emitted after cancel
            let mut rx = self.signaling_rx.lock().await;
            while rx.try_recv().is_ok() {}
        }
        if let Some(output) = room.output.take() {
            close_device(output).await;
        }

        let capture = self.capture.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || capture.shutdown()).await {
            warn!("Capture shutdown did not complete: {}", e);
        }
        *lock(&self.loopback) = false;
        self.refresh_override();
        let _ = self.events.send(SessionEvent::Disconnected(None));
        info!("Left room");
    }

    pub fn is_joined(&self) -> bool {
        lock(&self.engine).is_some()
    }

    /// Push-to-talk style request to send microphone audio.
    pub fn set_transmit(&self, transmit: bool) -> Result<(), ClientError> {
        self.capture.set_requested(transmit)
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), ClientError> {
        self.capture.set_muted(muted)?;
        let state = {
            let mut state = lock(&self.audio_state);
            state.mic_muted = muted;
            *state
        };
        self.refresh_override();
        self.publish(state);
        Ok(())
    }

    pub fn set_deafened(&self, deafened: bool) -> Result<(), ClientError> {
        self.capture.set_deafened(deafened)?;
        let state = {
            let mut state = lock(&self.audio_state);
            state.deafened = deafened;
            *state
        };
        self.refresh_override();
        self.publish(state);
        Ok(())
    }

    /// Plays the local microphone back instead of the room.
    pub fn set_loopback(&self, loopback: bool) -> Result<(), ClientError> {
        self.capture.set_loopback(loopback)?;
        *lock(&self.loopback) = loopback;
        self.refresh_override();
        Ok(())
    }

    pub fn audio_state(&self) -> AudioState {
        *lock(&self.audio_state)
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        lock(&self.engine)
            .as_ref()
            .map(|engine| engine.peers())
            .unwrap_or_default()
    }

    /// The local id reports the microphone; any other id its playback channel.
    pub fn is_speaking(&self, peer_id: &PeerId) -> bool {
        if peer_id == &self.config.peer_id {
            return self.capture.is_speaking();
        }
        self.mixer.channel_has_activity(peer_id)
    }

    fn refresh_override(&self) {
        let state = *lock(&self.audio_state);
        let loopback = *lock(&self.loopback);
        self.mixer
            .set_local_override(state.mic_muted || state.deafened || loopback);
    }

    fn publish(&self, state: AudioState) {
        let engine = lock(&self.engine).clone();
        if let Some(engine) = engine {
            if let Err(e) = engine.publish_audio_state(state) {
                debug!("Audio state not published: {}", e);
            }
        }
    }
}

async fn close_device(device: Box<dyn DeviceHandle>) {
    if let Err(e) = tokio::task::spawn_blocking(move || device.close()).await {
        warn!("Closing audio device did not complete: {}", e);
    }
}

async fn dispatch_signaling(
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<SignalingEvent>>>,
    engine: NegotiationEngine,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
) {
    let mut rx = rx.lock().await;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        match event {
            SignalingEvent::Message(envelope) => engine.handle_envelope(envelope).await,
            SignalingEvent::Connected => debug!("Relay transport connected"),
            SignalingEvent::Ready => {
                let _ = events.send(SessionEvent::Ready);
            }
            SignalingEvent::Disconnected(reason) => {
                // the relay re-announces every peer after a reconnect
                engine.close_all().await;
                if let Some(e) = &reason {
                    warn!("Relay session ended: {}", e);
                }
                let _ = events.send(SessionEvent::Disconnected(reason));
            }
            SignalingEvent::Errored(e) => {
                warn!("Relay connection error: {}", e);
                let _ = events.send(SessionEvent::Error(e));
            }
        }
    }
}

async fn forward_peer_events(
    mut rx: broadcast::Receiver<PeerEvent>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(event) => {
                let _ = events.send(SessionEvent::Peer(event));
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Peer event subscriber lagged, {} events lost", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_captured_frames(
    rx: Arc<AsyncMutex<mpsc::Receiver<AudioFrame>>>,
    capture: Arc<CapturePipeline>,
    mixer: Arc<Mixer>,
    engine: NegotiationEngine,
    cancel: CancellationToken,
) {
    let mut rx = rx.lock().await;
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if capture.is_loopback() {
            mixer.push_loopback(&frame);
        }
        if !capture.is_transmitting() {
            continue;
        }
        match encode_frame(&frame) {
            Ok(wire) => {
                engine.broadcast_frame(wire);
            }
            Err(e) => debug!("Captured frame not sent: {}", e),
        }
    }
}
