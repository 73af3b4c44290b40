//! Client side of the proxima voice relay: the relay connection, peer link
//! negotiation, microphone capture and the spatial playback mixer.

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod negotiation;
pub mod session;
pub mod signaling;
pub mod volume;

pub use config::{AudioConfig, ClientConfig, VolumeConfig};
pub use error::{ClientError, RoomErrorKind};
pub use session::{SessionDeps, SessionEvent, VoiceSession};
