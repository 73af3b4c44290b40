use crate::signaling::{
    ConnectionState, Connector, PlatformProbe, SignalingEvent, SignalingOutput, Transport,
};
use crate::{ClientConfig, ClientError};
use proxima_core::{ClientFrame, JoinRequest, Payload, PeerId, ServerFrame, SignalEnvelope};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capped exponential reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

struct Link {
    out_tx: mpsc::UnboundedSender<ClientFrame>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ClientInner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    probe: Arc<dyn PlatformProbe>,
    events: mpsc::UnboundedSender<SignalingEvent>,
    state: Mutex<ConnectionState>,
    link: Mutex<Option<Link>>,
}

impl ClientInner {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state() = state;
    }

    fn emit(&self, event: SignalingEvent) {
        let _ = self.events.send(event);
    }
}

enum SessionEnd {
    Cancelled,
    /// The relay ended the session on purpose. No reconnect.
    Rejected(ClientError),
    Lost { error: ClientError, was_ready: bool },
}

/// One logical relay connection with automatic reconnection.
#[derive(Clone)]
pub struct SignalingClient {
    inner: Arc<ClientInner>,
}

impl SignalingClient {
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        probe: Arc<dyn PlatformProbe>,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                connector,
                probe,
                events,
                state: Mutex::new(ConnectionState::Disconnected),
                link: Mutex::new(None),
            }),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.inner.config.peer_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state()
    }

    /// Starts connecting in the background and returns the token that ends the
    /// connection. Fails fast, without side effects, while another connection
    /// is live or when the platform probe rejects the setup.
    pub fn connect(
        &self,
        room: &str,
        password: &str,
        hints: Vec<PeerId>,
    ) -> Result<CancellationToken, ClientError> {
        {
            let mut state = self.inner.state();
            if *state != ConnectionState::Disconnected {
                return Err(ClientError::AlreadyConnected);
            }
            self.inner.probe.check(&self.inner.config.relay_url)?;
            *state = ConnectionState::Connecting;
        }

        let join = JoinRequest {
            token: self.inner.config.auth_token.clone(),
            peer_id: self.inner.config.peer_id.clone(),
            peer_type: self.inner.config.peer_type.clone(),
            room_name: room.to_owned(),
            room_password: password.to_owned(),
            players_in_instance: hints,
        };

        let cancel = CancellationToken::new();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(
            self.inner.clone(),
            join,
            out_rx,
            cancel.clone(),
        ));

        let mut link = self.inner.link.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = link.replace(Link {
            out_tx,
            cancel: cancel.clone(),
            task,
        }) {
            old.cancel.cancel();
        }
        Ok(cancel)
    }

    /// Ends the connection and waits for its task to wind down.
    pub async fn disconnect(&self) {
        let link = self
            .inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(link) = link {
            link.cancel.cancel();
            let _ = link.task.await;
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    fn send_envelope(&self, envelope: SignalEnvelope) -> Result<(), ClientError> {
        if self.state() < ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let link = self.inner.link.lock().unwrap_or_else(PoisonError::into_inner);
        let link = link.as_ref().ok_or(ClientError::NotConnected)?;
        link.out_tx
            .send(ClientFrame::Message(envelope))
            .map_err(|_| ClientError::NotConnected)
    }
}

impl SignalingOutput for SignalingClient {
    fn send_direct(&self, target: &PeerId, payload: Payload) -> Result<(), ClientError> {
        self.send_envelope(SignalEnvelope::direct(
            self.local_id().clone(),
            target.clone(),
            payload,
        ))
    }

    fn send_broadcast(&self, payload: Payload) -> Result<(), ClientError> {
        self.send_envelope(SignalEnvelope::broadcast(self.local_id().clone(), payload))
    }
}

async fn run_connection(
    inner: Arc<ClientInner>,
    join: JoinRequest,
    mut out_rx: mpsc::UnboundedReceiver<ClientFrame>,
    cancel: CancellationToken,
) {
    let url = inner.config.relay_url.clone();
    let mut backoff = Backoff::new(inner.config.reconnect_initial, inner.config.reconnect_max);

    loop {
        inner.set_state(ConnectionState::Connecting);

        if let Err(e) = inner.probe.check(&url) {
            inner.emit(SignalingEvent::Errored(e));
            break;
        }

        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            attempt = inner.connector.connect(&url) => attempt,
        };

        let mut transport = match attempt {
            Ok(transport) => transport,
            Err(e) => {
                warn!("Relay connection to {} failed: {}", url, e);
                let retry = e.is_retryable();
                inner.emit(SignalingEvent::Errored(e));
                if retry && wait_or_cancel(&cancel, backoff.next_delay()).await {
                    continue;
                }
                break;
            }
        };

        // frames queued for a previous session are meaningless now
        while out_rx.try_recv().is_ok() {}

        inner.set_state(ConnectionState::Connected);
        inner.emit(SignalingEvent::Connected);
        info!("Connected to relay {}, joining '{}'", url, join.room_name);

        let end = match transport.send(&ClientFrame::Join(join.clone())).await {
            Ok(()) => pump(&inner, transport.as_mut(), &mut out_rx, &cancel).await,
            Err(error) => SessionEnd::Lost {
                error,
                was_ready: false,
            },
        };
        transport.close().await;

        match end {
            SessionEnd::Cancelled => break,
            SessionEnd::Rejected(error) => {
                warn!("Relay ended the session: {}", error);
                inner.set_state(ConnectionState::Disconnected);
                inner.emit(SignalingEvent::Disconnected(Some(error)));
                return;
            }
            SessionEnd::Lost { error, was_ready } => {
                warn!("Relay connection lost: {}", error);
                inner.set_state(ConnectionState::Connecting);
                inner.emit(SignalingEvent::Disconnected(Some(error)));
                if was_ready {
                    backoff.reset();
                }
                if !wait_or_cancel(&cancel, backoff.next_delay()).await {
                    break;
                }
            }
        }
    }

    inner.set_state(ConnectionState::Disconnected);
    if cancel.is_cancelled() {
        inner.emit(SignalingEvent::Disconnected(None));
    }
    debug!("Relay connection task finished");
}

async fn pump(
    inner: &ClientInner,
    transport: &mut dyn Transport,
    out_rx: &mut mpsc::UnboundedReceiver<ClientFrame>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let mut ready = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            Some(frame) = out_rx.recv() => {
                if let Err(error) = transport.send(&frame).await {
                    return SessionEnd::Lost { error, was_ready: ready };
                }
            }
            incoming = transport.recv() => match incoming {
                None => {
                    return SessionEnd::Lost {
                        error: ClientError::Transport("relay closed the connection".to_owned()),
                        was_ready: ready,
                    };
                }
                Some(Err(error)) => return SessionEnd::Lost { error, was_ready: ready },
                Some(Ok(ServerFrame::ServerDisconnect { reason })) => {
                    return SessionEnd::Rejected(ClientError::from_disconnect(&reason));
                }
                Some(Ok(ServerFrame::Message(envelope))) => {
                    if !ready {
                        ready = true;
                        inner.set_state(ConnectionState::Ready);
                        inner.emit(SignalingEvent::Ready);
                    }
                    inner.emit(SignalingEvent::Message(envelope));
                }
            }
        }
    }
}

/// Sleeps for `delay`. Returns `false` if cancelled first.
async fn wait_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
