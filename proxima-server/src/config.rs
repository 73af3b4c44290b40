use clap::Parser;
use proxima_core::utils::PUBLIC_ROOM_PREFIX;
use std::net::SocketAddr;
use std::time::Duration;

/// Runtime settings of the relay. Every flag can also come from a `PROXIMA_*` variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "proximad", version, about = "Proxima voice signaling relay")]
pub struct ServerConfig {
    /// Address the HTTP and websocket listener binds to.
    #[arg(long, env = "PROXIMA_LISTEN", default_value = "0.0.0.0:3030")]
    pub listen: SocketAddr,

    /// Token every join must present. Unset means the relay is open.
    #[arg(long, env = "PROXIMA_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Shared secret of the TURN server (`use-auth-secret`).
    #[arg(long, env = "PROXIMA_TURN_SECRET")]
    pub turn_secret: Option<String>,

    #[arg(long = "turn-url", env = "PROXIMA_TURN_URLS", value_delimiter = ',')]
    pub turn_urls: Vec<String>,

    /// Suffix of generated TURN usernames.
    #[arg(long, env = "PROXIMA_TURN_LABEL", default_value = "proxima")]
    pub turn_label: String,

    #[arg(long, env = "PROXIMA_TURN_TTL_SECS", default_value_t = 86_400)]
    pub turn_ttl_secs: u64,

    #[arg(long, env = "PROXIMA_PUBLIC_PREFIX", default_value = PUBLIC_ROOM_PREFIX)]
    pub public_room_prefix: String,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "PROXIMA_LOG", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn turn_ttl(&self) -> Duration {
        Duration::from_secs(self.turn_ttl_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3030)),
            auth_token: None,
            turn_secret: None,
            turn_urls: Vec::new(),
            turn_label: "proxima".to_owned(),
            turn_ttl_secs: 86_400,
            public_room_prefix: PUBLIC_ROOM_PREFIX.to_owned(),
            log_level: "info".to_owned(),
        }
    }
}
