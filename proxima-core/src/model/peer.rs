use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::RESERVED_PEER_IDS;

/// Opaque, caller-chosen identifier of a participant. Unique per relay process.
#[derive(Debug, Serialize, Deserialize, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids that collide with relay addressing (`"all"`, `"server"`) or are empty.
    pub fn is_reserved(&self) -> bool {
        self.0.is_empty() || RESERVED_PEER_IDS.contains(&self.0.as_str())
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Published audio flags of a participant.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioState {
    pub mic_muted: bool,
    pub deafened: bool,
}

/// What the relay tells clients about a member of their instance.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub peer_id: PeerId,
    pub peer_type: String,
    #[serde(default)]
    pub audio_state: AudioState,
}

impl PeerSummary {
    pub fn new(peer_id: PeerId, peer_type: impl Into<String>) -> Self {
        Self {
            peer_id,
            peer_type: peer_type.into(),
            audio_state: AudioState::default(),
        }
    }
}
