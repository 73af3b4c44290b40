/// Public STUN servers used when neither the relay nor the user supplies ICE servers.
pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_2: &str = "stun:stun1.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_3: &str = "stun:stun2.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_4: &str = "stun:stun3.l.google.com:19302";

/// Broadcast target literal in relay envelopes.
pub const TARGET_ALL: &str = "all";

/// `from` value of envelopes the relay originates itself.
pub const SERVER_PEER_ID: &str = "server";

pub const RESERVED_PEER_IDS: [&str; 2] = [TARGET_ALL, SERVER_PEER_ID];

/// Rooms whose name starts with this prefix are split into numbered instances.
pub const PUBLIC_ROOM_PREFIX: &str = "public";

pub const REASON_INCORRECT_PASSWORD: &str = "incorrect password";
pub const REASON_ROOM_NOT_FOUND: &str = "room does not exist";
pub const REASON_DUPLICATE_PEER: &str = "duplicate peer id";
pub const REASON_UNAUTHORIZED: &str = "unauthorized";
pub const REASON_INVALID_PEER_ID: &str = "invalid peer id";

/// Label of the data channel that carries audio frames.
pub const AUDIO_CHANNEL_LABEL: &str = "audio";

pub fn default_stun_urls() -> Vec<String> {
    [
        DEFAULT_STUN_ADDR,
        DEFAULT_STUN_ADDR_2,
        DEFAULT_STUN_ADDR_3,
        DEFAULT_STUN_ADDR_4,
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}
