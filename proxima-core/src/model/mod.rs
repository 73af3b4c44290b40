mod frame;
mod peer;
mod signaling;

pub use frame::{
    AudioFrame, FRAME_HEADER_LEN, FrameError, VOICE_BITS_PER_SAMPLE, VOICE_BYTES_PER_FRAME,
    VOICE_CHANNELS, VOICE_FRAME_DURATION_MS, VOICE_SAMPLE_RATE, VOICE_SAMPLES_PER_FRAME,
    decode_frame, encode_frame,
};
pub use peer::{AudioState, PeerId, PeerSummary};
pub use signaling::{
    ClientFrame, DisconnectReason, IceCandidate, IceServerConfig, JoinRequest, Payload, SdpKind,
    ServerFrame, SessionDescription, SignalEnvelope, Target,
};
