use crate::AudioConfig;
use crate::audio::{
    Append, PlaybackChannel, ProcessingFactory, SampleSource, VoiceDetector, pcm16_to_f32,
};
use crate::clock::Clock;
use crate::negotiation::FrameSink;
use dashmap::{DashMap, DashSet};
use proxima_core::{AudioFrame, PeerId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

struct PeerChannel {
    playback: PlaybackChannel,
    /// `None` when voice detection is off: every frame then counts as speech.
    detector: Mutex<Option<Box<dyn VoiceDetector>>>,
}

impl PeerChannel {
    fn classify(&self, samples: &[f32]) -> bool {
        let mut detector = self.detector.lock().unwrap_or_else(PoisonError::into_inner);
        match detector.as_mut() {
            Some(detector) => detector.is_voiced(samples),
            None => true,
        }
    }
}

/// Sums every peer's jitter buffer plus the local loopback buffer into one
/// mono stream. Always produces output, zero-filled when nothing is buffered.
pub struct Mixer {
    config: AudioConfig,
    clock: Arc<dyn Clock>,
    processing: Arc<dyn ProcessingFactory>,
    channels: DashMap<PeerId, Arc<PeerChannel>>,
    gains: DashMap<PeerId, f32>,
    /// Peers removed through [`FrameSink::remove_peer`] and not added back since.
    retired: DashSet<PeerId>,
    loopback: PlaybackChannel,
    /// Local mute, deafen or loopback monitoring: every peer plays at gain 0.
    local_override: AtomicBool,
}

impl Mixer {
    pub fn new(
        config: AudioConfig,
        clock: Arc<dyn Clock>,
        processing: Arc<dyn ProcessingFactory>,
    ) -> Self {
        let loopback = PlaybackChannel::new(&config, clock.clone());
        Self {
            config,
            clock,
            processing,
            channels: DashMap::new(),
            gains: DashMap::new(),
            retired: DashSet::new(),
            loopback,
            local_override: AtomicBool::new(false),
        }
    }

    fn channel(&self, peer_id: &PeerId) -> Arc<PeerChannel> {
        self.channels
            .entry(peer_id.clone())
            .or_insert_with(|| {
                debug!("Creating playback channel for {}", peer_id);
                let detector = if self.config.voice_detection {
                    match self.processing.detector() {
                        Ok(detector) => Some(detector),
                        Err(e) => {
                            warn!("Voice detector for {} unavailable: {:#}", peer_id, e);
                            None
                        }
                    }
                } else {
                    None
                };
                Arc::new(PeerChannel {
                    playback: PlaybackChannel::new(&self.config, self.clock.clone()),
                    detector: Mutex::new(detector),
                })
            })
            .value()
            .clone()
    }

    /// Queues a peer's frame, creating its channel on the first one.
    pub fn push(&self, peer_id: &PeerId, frame: &AudioFrame) {
        let samples = pcm16_to_f32(&frame.samples());
        let channel = self.channel(peer_id);
        let voiced = channel.classify(&samples);
        if channel.playback.append(&samples, voiced) == Append::Cleared {
            debug!("Playback buffer for {} overflowed and was cleared", peer_id);
        }
    }

    /// Queues locally captured audio for monitoring.
    pub fn push_loopback(&self, frame: &AudioFrame) {
        self.loopback.append(&pcm16_to_f32(&frame.samples()), true);
    }

    pub fn remove(&self, peer_id: &PeerId) {
        if self.channels.remove(peer_id).is_some() {
            debug!("Removed playback channel for {}", peer_id);
        }
        self.gains.remove(peer_id);
    }

    pub fn has_channel(&self, peer_id: &PeerId) -> bool {
        self.channels.contains_key(peer_id)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn buffered(&self, peer_id: &PeerId) -> usize {
        self.channels
            .get(peer_id)
            .map(|c| c.playback.len())
            .unwrap_or(0)
    }

    /// Distance-derived gain from the volume updater.
    pub fn set_gain(&self, peer_id: &PeerId, gain: f32) {
        self.gains.insert(peer_id.clone(), gain.clamp(0.0, 1.0));
    }

    /// Gain actually applied to `peer_id`. Peers never given a gain play at full volume.
    pub fn effective_gain(&self, peer_id: &PeerId) -> f32 {
        if self.local_override.load(Ordering::Acquire) {
            return 0.0;
        }
        self.gains.get(peer_id).map(|g| *g).unwrap_or(1.0)
    }

    pub fn set_local_override(&self, active: bool) {
        self.local_override.store(active, Ordering::Release);
    }

    pub fn channel_has_activity(&self, peer_id: &PeerId) -> bool {
        let Some(channel) = self.channels.get(peer_id).map(|c| c.value().clone()) else {
            return false;
        };
        channel.playback.has_activity(self.effective_gain(peer_id))
    }
}

impl SampleSource for Mixer {
    fn fill(&self, out: &mut [f32]) {
        out.fill(0.0);
        for entry in self.channels.iter() {
            // drained even at gain 0 so a silenced channel does not back up
            let gain = self.effective_gain(entry.key());
            entry.value().playback.mix_into(out, gain);
        }
        self.loopback.mix_into(out, 1.0);
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

impl FrameSink for Mixer {
    fn add_peer(&self, peer_id: &PeerId) {
        self.retired.remove(peer_id);
    }

    fn push_frame(&self, from: &PeerId, frame: AudioFrame) {
        if self.retired.contains(from) {
            return;
        }
        self.push(from, &frame);
        // a removal that raced the push above must not leave the channel behind
        if self.retired.contains(from) {
            self.channels.remove(from);
        }
    }

    fn remove_peer(&self, peer_id: &PeerId) {
        self.retired.insert(peer_id.clone());
        self.remove(peer_id);
    }
}
