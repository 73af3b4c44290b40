use proxima_core::{DisconnectReason, PeerId};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomErrorKind {
    IncorrectPassword,
    RoomNotFound,
}

impl fmt::Display for RoomErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomErrorKind::IncorrectPassword => f.write_str("incorrect password"),
            RoomErrorKind::RoomNotFound => f.write_str("room does not exist"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("relay rejected the authentication token")]
    Authentication,

    #[error("room rejected the join: {0}")]
    Room(RoomErrorKind),

    #[error("relay closed the session: {0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("negotiation with {peer} failed: {reason}")]
    Negotiation { peer: PeerId, reason: String },

    #[error("audio device failure: {0}")]
    AudioDevice(String),

    #[error("platform not supported: {0}")]
    PlatformUnsupported(String),

    #[error("already connected or connecting")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Maps a `serverDisconnect` reason onto the error surfaced to the caller.
    pub fn from_disconnect(reason: &str) -> Self {
        match DisconnectReason::classify(reason) {
            DisconnectReason::IncorrectPassword => ClientError::Room(RoomErrorKind::IncorrectPassword),
            DisconnectReason::RoomNotFound => ClientError::Room(RoomErrorKind::RoomNotFound),
            DisconnectReason::Unauthorized => ClientError::Authentication,
            DisconnectReason::Generic(reason) => ClientError::Rejected(reason),
        }
    }

    pub fn negotiation(peer: &PeerId, err: &anyhow::Error) -> Self {
        ClientError::Negotiation {
            peer: peer.clone(),
            reason: format!("{err:#}"),
        }
    }

    /// Only plain transport failures are worth reconnecting after.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}
