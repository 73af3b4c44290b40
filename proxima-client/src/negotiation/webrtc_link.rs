use crate::negotiation::{LinkFactory, LinkState, PeerLink, TransportEvent};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use proxima_core::utils::AUDIO_CHANNEL_LABEL;
use proxima_core::{IceCandidate, IceServerConfig, PeerId, SdpKind, SessionDescription};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// [`LinkFactory`] backed by webrtc-rs peer connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcLinkFactory;

#[async_trait]
impl LinkFactory for WebRtcLinkFactory {
    async fn create(
        &self,
        peer_id: &PeerId,
        ice_servers: Vec<IceServerConfig>,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerLink>> {
        let link = WebRtcLink::new(peer_id.clone(), ice_servers, event_tx).await?;
        Ok(Arc::new(link))
    }
}

pub struct WebRtcLink {
    pub peer_id: PeerId,
    peer_connection: Arc<RTCPeerConnection>,
    data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    event_tx: mpsc::Sender<TransportEvent>,
}

impl WebRtcLink {
    /// Инициализация нового WebRTC соединения.
    /// События транспорта уходят движку через `event_tx`.
    pub async fn new(
        peer_id: PeerId,
        ice_servers: Vec<IceServerConfig>,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self> {
        // Кодеки регистрируем, даже если используем только DataChannel
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .into_iter()
                .map(|server| RTCIceServer {
                    urls: server.urls,
                    username: server.username.unwrap_or_default(),
                    credential: server.credential.unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("Failed to create peer connection")?,
        );
        let data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>> = Arc::new(Mutex::new(None));

        // A. Состояние соединения
        let state_tx = event_tx.clone();
        let uid_state = peer_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let uid = uid_state.clone();

                Box::pin(async move {
                    info!("Peer connection state changed for {}: {:?}", uid, s);
                    let _ = tx
                        .send(TransportEvent::StateChanged(uid, link_state(s)))
                        .await;
                })
            },
        ));

        // B. Trickle ICE
        let ice_tx = event_tx.clone();
        let uid_ice = peer_id.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let uid = uid_ice.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                };
                let _ = tx
                    .send(TransportEvent::CandidateGenerated(uid, candidate))
                    .await;
            })
        }));

        // C. Входящий DataChannel (его открывает невежливая сторона)
        let dc_tx = event_tx.clone();
        let uid_dc = peer_id.clone();
        let dc_slot = data_channel.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let tx = dc_tx.clone();
            let uid = uid_dc.clone();
            let slot = dc_slot.clone();

            Box::pin(async move {
                debug!("New DataChannel '{}' from {}", dc.label(), uid);
                setup_data_channel(&dc, uid, tx, slot);
            })
        }));

        Ok(Self {
            peer_id,
            peer_connection,
            data_channel,
            event_tx,
        })
    }

    fn open_channel(&self) -> Option<Arc<RTCDataChannel>> {
        self.data_channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|dc| dc.ready_state() == RTCDataChannelState::Open)
    }
}

fn setup_data_channel(
    dc: &Arc<RTCDataChannel>,
    uid: PeerId,
    tx: mpsc::Sender<TransportEvent>,
    slot: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
) {
    let dc_on_open = dc.clone();
    let tx_open = tx.clone();
    let uid_open = uid.clone();
    dc.on_open(Box::new(move || {
        let tx = tx_open.clone();
        let uid = uid_open.clone();
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(dc_on_open.clone());

        Box::pin(async move {
            info!("DataChannel open and ready for {}", uid);
            let _ = tx.send(TransportEvent::DataChannelReady(uid)).await;
        })
    }));

    let tx_close = tx.clone();
    let uid_close = uid.clone();
    dc.on_close(Box::new(move || {
        let tx = tx_close.clone();
        let uid = uid_close.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::DataChannelClosed(uid)).await;
        })
    }));

    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = tx.clone();
        let uid = uid.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::Message(uid, msg.data)).await;
        })
    }));
}

fn link_state(s: RTCPeerConnectionState) -> LinkState {
    match s {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => LinkState::New,
        RTCPeerConnectionState::Connecting => LinkState::Connecting,
        RTCPeerConnectionState::Connected => LinkState::Connected,
        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
        RTCPeerConnectionState::Failed => LinkState::Failed,
        RTCPeerConnectionState::Closed => LinkState::Closed,
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_offer(&self) -> Result<SessionDescription> {
        // Аудио: без упорядочивания и без повторных отправок
        let init = RTCDataChannelInit {
            ordered: Some(false),
            max_retransmits: Some(0),
            ..Default::default()
        };
        let dc = self
            .peer_connection
            .create_data_channel(AUDIO_CHANNEL_LABEL, Some(init))
            .await
            .context("Failed to create data channel")?;
        setup_data_channel(
            &dc,
            self.peer_id.clone(),
            self.event_tx.clone(),
            self.data_channel.clone(),
        );

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .context("Failed to create offer")?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .context("Failed to set local description")?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        self.peer_connection
            .set_remote_description(to_rtc(offer)?)
            .await
            .context("Failed to set remote offer")?;
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .context("Failed to create answer")?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await
            .context("Failed to set local description")?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn accept_answer(&self, answer: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(answer)?)
            .await
            .context("Failed to set remote answer")?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .context("Failed to add ICE candidate")?;
        Ok(())
    }

    async fn send(&self, frame: Bytes) -> Result<()> {
        let Some(dc) = self.open_channel() else {
            bail!("data channel to {} is not open", self.peer_id);
        };
        dc.send(&frame).await.context("Failed to send frame")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let dc = self
            .data_channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dc) = dc {
            let _ = dc.close().await;
        }
        self.peer_connection.close().await?;
        Ok(())
    }
}
