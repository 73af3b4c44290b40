use proxima_core::utils::default_stun_urls;
use proxima_core::volume::{FalloffKind, FalloffParams};
use proxima_core::{IceServerConfig, PeerId};
use serde::Deserialize;
use std::time::Duration;

/// Client-side inputs. Loading and persisting them is the host's business.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub relay_url: String,
    pub auth_token: Option<String>,
    pub peer_id: PeerId,
    pub peer_type: String,
    /// Replaces the relay-issued TURN server when set.
    pub turn_override: Option<IceServerConfig>,
    pub stun_urls: Vec<String>,
    #[serde(with = "millis")]
    pub reconnect_initial: Duration,
    #[serde(with = "millis")]
    pub reconnect_max: Duration,
    pub audio: AudioConfig,
    pub volume: VolumeConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:3030/ws".to_owned(),
            auth_token: None,
            peer_id: PeerId::default(),
            peer_type: "player".to_owned(),
            turn_override: None,
            stun_urls: default_stun_urls(),
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            audio: AudioConfig::default(),
            volume: VolumeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioConfig {
    /// Index into `input_devices()`. `None` picks the host default.
    pub input_device: Option<usize>,
    pub output_device: Option<usize>,
    pub denoise: bool,
    pub voice_detection: bool,
    #[serde(with = "millis")]
    pub target_latency: Duration,
    pub buffer_count: usize,
    /// Minimum spacing between two overflow clears of one playback channel.
    #[serde(with = "millis")]
    pub clear_cooldown: Duration,
    /// How long after its last frame a channel still counts as active.
    #[serde(with = "millis")]
    pub activity_window: Duration,
    /// Capacity of the capture-to-network frame queue.
    pub capture_queue: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            denoise: true,
            voice_detection: true,
            target_latency: Duration::from_millis(100),
            buffer_count: 3,
            clear_cooldown: Duration::from_millis(500),
            activity_window: Duration::from_millis(300),
            capture_queue: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VolumeConfig {
    pub min_distance: f32,
    pub max_distance: f32,
    pub falloff_factor: f32,
    pub falloff_kind: FalloffKind,
    #[serde(with = "millis")]
    pub suppression_grace: Duration,
    #[serde(with = "millis")]
    pub tick: Duration,
}

impl VolumeConfig {
    pub fn falloff(&self) -> FalloffParams {
        FalloffParams {
            min_distance: self.min_distance,
            max_distance: self.max_distance,
            falloff_factor: self.falloff_factor,
            kind: self.falloff_kind,
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        let falloff = FalloffParams::default();
        Self {
            min_distance: falloff.min_distance,
            max_distance: falloff.max_distance,
            falloff_factor: falloff.falloff_factor,
            falloff_kind: falloff.kind,
            suppression_grace: Duration::from_secs(3),
            tick: Duration::from_millis(100),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        u64::deserialize(de).map(Duration::from_millis)
    }
}
