pub use proxima_core::model::PeerId;

pub mod model {
    pub use proxima_core::model::*;
}

pub mod volume {
    pub use proxima_core::volume::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use proxima_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use proxima_client::*;
}
