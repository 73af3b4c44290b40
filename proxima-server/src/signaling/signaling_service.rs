use crate::http::Metrics;
use crate::room::{Placement, RoomManager, RoomView};
use crate::turn::TurnIssuer;
use crate::{JoinError, ServerConfig};
use axum::extract::ws::Message;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use proxima_core::{
    AudioState, JoinRequest, Payload, PeerId, PeerSummary, ServerFrame, SignalEnvelope, Target,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct PeerConnection {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
    placement: Placement,
    peer_type: String,
    connected_at: SystemTime,
}

struct SignalingInner {
    peers: DashMap<PeerId, PeerConnection>,
    rooms: RoomManager,
    turn: Option<TurnIssuer>,
    auth_token: Option<String>,
    metrics: Metrics,
}

/// A joined websocket, as seen by its connection task.
#[derive(Debug, Clone)]
pub struct Session {
    pub peer_id: PeerId,
    pub session_id: Uuid,
    pub placement: Placement,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    pub peer_id: PeerId,
    pub peer_type: String,
    pub room_name: String,
    pub instance: u32,
    /// Unix seconds.
    pub connected_at: u64,
    pub audio_state: AudioState,
}

#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new(config: &ServerConfig, metrics: Metrics) -> Self {
        let turn = match &config.turn_secret {
            Some(secret) if !config.turn_urls.is_empty() => Some(TurnIssuer::new(
                secret.clone(),
                config.turn_urls.clone(),
                config.turn_label.clone(),
                config.turn_ttl(),
            )),
            Some(_) => {
                warn!("TURN secret configured without TURN urls, credentials disabled");
                None
            }
            None => None,
        };

        Self {
            inner: Arc::new(SignalingInner {
                peers: DashMap::new(),
                rooms: RoomManager::new(config.public_room_prefix.clone()),
                turn,
                auth_token: config.auth_token.clone(),
                metrics,
            }),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Admits a peer, answers it with the instance's member list and tells the
    /// members about it. The joiner is the impolite side of every new pair.
    pub fn join(
        &self,
        req: JoinRequest,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Result<Session, JoinError> {
        match self.admit(&req, tx) {
            Ok((session, existing)) => {
                self.announce(&req, &existing);
                Ok(session)
            }
            Err(e) => {
                warn!("Join of {} to '{}' refused: {}", req.peer_id, req.room_name, e);
                self.inner.metrics.record_join_failure(e.metric_label());
                Err(e)
            }
        }
    }

    fn admit(
        &self,
        req: &JoinRequest,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Result<(Session, Vec<PeerSummary>), JoinError> {
        if let Some(expected) = &self.inner.auth_token {
            if req.token.as_deref() != Some(expected.as_str()) {
                return Err(JoinError::Unauthorized);
            }
        }
        if req.peer_id.is_reserved() {
            return Err(JoinError::InvalidPeerId);
        }

        let session_id = Uuid::new_v4();
        let outcome = match self.inner.peers.entry(req.peer_id.clone()) {
            Entry::Occupied(_) => return Err(JoinError::DuplicatePeer),
            Entry::Vacant(slot) => {
                let outcome = self.inner.rooms.join(req)?;
                slot.insert(PeerConnection {
                    session_id,
                    tx,
                    placement: outcome.placement.clone(),
                    peer_type: req.peer_type.clone(),
                    connected_at: SystemTime::now(),
                });
                outcome
            }
        };
        self.refresh_gauges();

        Ok((
            Session {
                peer_id: req.peer_id.clone(),
                session_id,
                placement: outcome.placement,
            },
            outcome.existing,
        ))
    }

    fn announce(&self, req: &JoinRequest, existing: &[PeerSummary]) {
        let turn_config = self.inner.turn.as_ref().and_then(|issuer| match issuer.issue() {
            Ok(config) => Some(config),
            Err(e) => {
                error!("Failed to issue TURN credentials: {}", e);
                None
            }
        });

        self.send_envelope(
            &req.peer_id,
            SignalEnvelope::from_server(
                req.peer_id.clone(),
                Payload::Open {
                    connections: existing.to_vec(),
                    be_polite: false,
                    turn_config,
                },
            ),
        );

        let joiner = PeerSummary::new(req.peer_id.clone(), req.peer_type.clone());
        for member in existing {
            self.send_envelope(
                &member.peer_id,
                SignalEnvelope::from_server(
                    member.peer_id.clone(),
                    Payload::Open {
                        connections: vec![joiner.clone()],
                        be_polite: true,
                        turn_config: None,
                    },
                ),
            );
        }
    }

    /// Relays one envelope from a joined peer. `from` is always rewritten to the sender.
    pub fn handle_envelope(&self, session: &Session, mut envelope: SignalEnvelope) {
        self.inner.metrics.record_message(envelope.payload.action());

        if envelope.from != session.peer_id {
            debug!(
                "Rewriting from '{}' to '{}' on relayed envelope",
                envelope.from, session.peer_id
            );
            envelope.from = session.peer_id.clone();
        }

        match &mut envelope.payload {
            Payload::Open { .. } => {
                warn!("Peer {} sent an open envelope, dropped", session.peer_id);
                return;
            }
            Payload::Update { connections } => {
                connections.retain(|summary| {
                    let own = summary.peer_id == session.peer_id;
                    if !own {
                        warn!(
                            "Peer {} tried to update the audio state of {}, dropped",
                            session.peer_id, summary.peer_id
                        );
                    }
                    own
                });
                let Some(own) = connections.pop() else {
                    return;
                };
                self.inner
                    .rooms
                    .set_audio_state(&session.placement, &session.peer_id, own.audio_state);
                *connections = vec![own];
            }
            Payload::Sdp { .. } | Payload::Ice { .. } | Payload::Close => {}
        }

        self.route(session, envelope);
    }

    fn route(&self, session: &Session, envelope: SignalEnvelope) {
        match &envelope.target {
            Target::All => {
                for member in self.inner.rooms.members(&session.placement) {
                    if member != session.peer_id {
                        self.send_envelope(&member, envelope.clone());
                    }
                }
            }
            Target::Peer(target) => {
                if target != &session.peer_id
                    && self.inner.rooms.contains(&session.placement, target)
                {
                    self.send_envelope(target, envelope.clone());
                } else {
                    warn!(
                        "Dropping {} from {} to {}: not a member of its instance",
                        envelope.payload.action(),
                        session.peer_id,
                        target
                    );
                }
            }
        }
    }

    /// Forgets the session and tells the rest of its instance the peer is gone.
    /// A second call for the same session is a no-op.
    pub fn disconnect(&self, session: &Session) {
        let removed = self
            .inner
            .peers
            .remove_if(&session.peer_id, |_, conn| conn.session_id == session.session_id);
        if removed.is_none() {
            return;
        }

        let remaining = self.inner.rooms.leave(&session.placement, &session.peer_id);
        self.refresh_gauges();
        info!(
            "Peer {} left room '{}' instance {}",
            session.peer_id, session.placement.room_name, session.placement.instance
        );

        let close = SignalEnvelope::broadcast(session.peer_id.clone(), Payload::Close);
        for member in remaining {
            self.send_envelope(&member, close.clone());
        }
    }

    pub fn send_envelope(&self, peer_id: &PeerId, envelope: SignalEnvelope) {
        self.send_frame(peer_id, &ServerFrame::Message(envelope));
    }

    pub fn send_frame(&self, peer_id: &PeerId, frame: &ServerFrame) {
        let tx = match self.inner.peers.get(peer_id) {
            Some(conn) => conn.tx.clone(),
            None => {
                warn!("Attempted to send signal to disconnected peer {}", peer_id);
                return;
            }
        };
        match serde_json::to_string(frame) {
            Ok(json) => {
                if let Err(e) = tx.send(Message::Text(json.into())) {
                    error!("Failed to send WS message to {}: {:?}", peer_id, e);
                }
            }
            Err(e) => error!("Failed to serialize server frame: {}", e),
        }
    }

    fn refresh_gauges(&self) {
        let metrics = &self.inner.metrics;
        metrics.connections.set(self.inner.peers.len() as i64);
        metrics.rooms.set(self.inner.rooms.room_count() as i64);
    }

    pub fn connections(&self) -> Vec<ConnectionView> {
        let snapshot: Vec<(PeerId, String, Placement, SystemTime)> = self
            .inner
            .peers
            .iter()
            .map(|entry| {
                let conn = entry.value();
                (
                    entry.key().clone(),
                    conn.peer_type.clone(),
                    conn.placement.clone(),
                    conn.connected_at,
                )
            })
            .collect();

        let mut views: Vec<ConnectionView> = snapshot
            .into_iter()
            .map(|(peer_id, peer_type, placement, connected_at)| {
                let audio_state = self
                    .inner
                    .rooms
                    .summary(&placement, &peer_id)
                    .map(|s| s.audio_state)
                    .unwrap_or_default();
                ConnectionView {
                    peer_type,
                    room_name: placement.room_name,
                    instance: placement.instance,
                    connected_at: connected_at
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or_default(),
                    audio_state,
                    peer_id,
                }
            })
            .collect();
        views.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        views
    }

    pub fn rooms(&self) -> Vec<RoomView> {
        self.inner.rooms.snapshot()
    }
}
