//! Shared protocol model for the proxima voice relay: peer ids, relay envelopes,
//! the audio frame wire codec, and the spatial volume model.

pub mod model;
pub mod utils;
pub mod volume;

pub use model::*;
