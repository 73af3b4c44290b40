mod engine;
mod events;
mod link;
mod peer;
mod webrtc_link;

pub use engine::*;
pub use events::*;
pub use link::*;
pub use peer::*;
pub use webrtc_link::*;
