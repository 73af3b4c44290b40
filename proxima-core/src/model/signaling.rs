use crate::model::peer::{PeerId, PeerSummary};
use crate::utils::{
    REASON_INCORRECT_PASSWORD, REASON_ROOM_NOT_FOUND, REASON_UNAUTHORIZED, SERVER_PEER_ID,
    TARGET_ALL,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Envelope addressing: everyone else in the instance, or one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Target {
    All,
    Peer(PeerId),
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        if s == TARGET_ALL {
            Target::All
        } else {
            Target::Peer(PeerId(s))
        }
    }
}

impl From<Target> for String {
    fn from(t: Target) -> Self {
        match t {
            Target::All => TARGET_ALL.to_owned(),
            Target::Peer(id) => id.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Trickle ICE candidate in the browser `RTCIceCandidateInit` JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Payload {
    Open {
        connections: Vec<PeerSummary>,
        #[serde(rename = "bePolite")]
        be_polite: bool,
        #[serde(
            rename = "turnConfig",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        turn_config: Option<IceServerConfig>,
    },
    Sdp {
        sdp: SessionDescription,
    },
    Ice {
        ice: IceCandidate,
    },
    Update {
        connections: Vec<PeerSummary>,
    },
    Close,
}

impl Payload {
    pub fn action(&self) -> &'static str {
        match self {
            Payload::Open { .. } => "open",
            Payload::Sdp { .. } => "sdp",
            Payload::Ice { .. } => "ice",
            Payload::Update { .. } => "update",
            Payload::Close => "close",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalEnvelope {
    pub from: PeerId,
    pub target: Target,
    pub payload: Payload,
}

impl SignalEnvelope {
    pub fn broadcast(from: PeerId, payload: Payload) -> Self {
        Self {
            from,
            target: Target::All,
            payload,
        }
    }

    pub fn direct(from: PeerId, to: PeerId, payload: Payload) -> Self {
        Self {
            from,
            target: Target::Peer(to),
            payload,
        }
    }

    /// An envelope the relay sends on its own behalf.
    pub fn from_server(to: PeerId, payload: Payload) -> Self {
        Self::direct(PeerId::from(SERVER_PEER_ID), to, payload)
    }
}

/// First frame a client sends after the websocket handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub peer_id: PeerId,
    pub peer_type: String,
    pub room_name: String,
    #[serde(default)]
    pub room_password: String,
    /// Peers the caller believes already share its instance.
    #[serde(default)]
    pub players_in_instance: Vec<PeerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    Join(JoinRequest),
    Message(SignalEnvelope),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    Message(SignalEnvelope),
    ServerDisconnect { reason: String },
}

/// Client-side reading of a `serverDisconnect` reason string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    IncorrectPassword,
    RoomNotFound,
    Unauthorized,
    Generic(String),
}

impl DisconnectReason {
    pub fn classify(reason: &str) -> Self {
        let normalized = reason.trim().to_ascii_lowercase();
        match normalized.as_str() {
            REASON_INCORRECT_PASSWORD => Self::IncorrectPassword,
            REASON_ROOM_NOT_FOUND => Self::RoomNotFound,
            REASON_UNAUTHORIZED => Self::Unauthorized,
            _ => Self::Generic(reason.to_owned()),
        }
    }
}
