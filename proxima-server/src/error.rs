use proxima_core::utils::{
    REASON_DUPLICATE_PEER, REASON_INCORRECT_PASSWORD, REASON_INVALID_PEER_ID,
    REASON_ROOM_NOT_FOUND, REASON_UNAUTHORIZED,
};
use thiserror::Error;

/// Why a join was refused. Every variant ends the websocket session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("peer id is already connected")]
    DuplicatePeer,

    #[error("room does not exist")]
    RoomNotFound,

    #[error("incorrect room password")]
    IncorrectPassword,

    #[error("authentication token rejected")]
    Unauthorized,

    #[error("peer id is reserved")]
    InvalidPeerId,
}

impl JoinError {
    /// Reason string carried by the `serverDisconnect` frame.
    pub fn reason(&self) -> &'static str {
        match self {
            JoinError::DuplicatePeer => REASON_DUPLICATE_PEER,
            JoinError::RoomNotFound => REASON_ROOM_NOT_FOUND,
            JoinError::IncorrectPassword => REASON_INCORRECT_PASSWORD,
            JoinError::Unauthorized => REASON_UNAUTHORIZED,
            JoinError::InvalidPeerId => REASON_INVALID_PEER_ID,
        }
    }

    /// Short label used for the join-failure metric.
    pub fn metric_label(&self) -> &'static str {
        match self {
            JoinError::DuplicatePeer => "duplicate_peer",
            JoinError::RoomNotFound => "room_not_found",
            JoinError::IncorrectPassword => "incorrect_password",
            JoinError::Unauthorized => "unauthorized",
            JoinError::InvalidPeerId => "invalid_peer_id",
        }
    }
}
