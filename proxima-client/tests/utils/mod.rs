pub mod fake_links;
pub mod helpers;

pub use fake_audio::*;
pub use fake_links::*;
pub use fake_relay::*;
pub use helpers::*;
