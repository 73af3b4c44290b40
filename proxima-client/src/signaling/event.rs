use crate::ClientError;
use proxima_core::{Payload, PeerId, SignalEnvelope};

/// Phase of the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Transport handshake done, join sent.
    Connected,
    /// First relay message seen. An empty room sends nothing else, so this is
    /// the only reliable readiness signal.
    Ready,
}

#[derive(Debug, Clone)]
pub enum SignalingEvent {
    Connected,
    Ready,
    Message(SignalEnvelope),
    /// The session ended. `None` means a local disconnect.
    Disconnected(Option<ClientError>),
    /// A connection attempt failed before the session started.
    Errored(ClientError),
}

/// Outgoing half of the relay connection, as seen by the negotiation engine.
pub trait SignalingOutput: Send + Sync {
    fn send_direct(&self, target: &PeerId, payload: Payload) -> Result<(), ClientError>;

    fn send_broadcast(&self, payload: Payload) -> Result<(), ClientError>;
}
