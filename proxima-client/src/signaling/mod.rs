mod client;
mod event;
mod platform;
mod transport;

pub use client::*;
pub use event::*;
pub use platform::*;
pub use transport::*;
