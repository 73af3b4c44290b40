use crate::AudioConfig;
use crate::clock::Clock;
use proxima_core::VOICE_SAMPLE_RATE;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Samples a channel may hold: target output latency times buffer count.
pub fn max_buffered_samples(config: &AudioConfig) -> usize {
    let per_buffer = config.target_latency.as_secs_f64() * f64::from(VOICE_SAMPLE_RATE);
    (per_buffer as usize * config.buffer_count).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Appended,
    /// The buffer was cleared before the append because it would have overflowed.
    Cleared,
}

#[derive(Debug, Default)]
struct ChannelState {
    samples: VecDeque<f32>,
    last_clear: Option<Instant>,
    last_append: Option<Instant>,
    last_voiced: bool,
    clears: u64,
}

/// Bounded per-peer jitter buffer. Appends come from the network side, drains
/// from the output callback; both hold the lock only for a copy.
pub struct PlaybackChannel {
    state: Mutex<ChannelState>,
    max_samples: usize,
    cooldown: Duration,
    activity_window: Duration,
    clock: Arc<dyn Clock>,
}

impl PlaybackChannel {
    pub fn new(config: &AudioConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(ChannelState::default()),
            max_samples: max_buffered_samples(config),
            cooldown: config.clear_cooldown,
            activity_window: config.activity_window,
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.max_samples
    }

    /// Queues `samples`. An append that would overflow clears the buffer first,
    /// unless the last clear is more recent than the cool-down, in which case
    /// the buffer is allowed to run long.
    pub fn append(&self, samples: &[f32], voiced: bool) -> Append {
        let now = self.clock.now();
        let mut state = self.state();
        let mut outcome = Append::Appended;

        if state.samples.len() + samples.len() > self.max_samples {
            let cooled = state
                .last_clear
                .is_none_or(|at| now.saturating_duration_since(at) >= self.cooldown);
            if cooled {
                state.samples.clear();
                state.last_clear = Some(now);
                state.clears += 1;
                outcome = Append::Cleared;
            }
        }

        state.samples.extend(samples.iter().copied());
        state.last_append = Some(now);
        state.last_voiced = voiced;
        outcome
    }

    /// Adds up to `out.len()` buffered samples, scaled by `gain`, into `out`.
    /// Returns how many samples were consumed.
    pub fn mix_into(&self, out: &mut [f32], gain: f32) -> usize {
        let mut state = self.state();
        let n = out.len().min(state.samples.len());
        for (dst, sample) in out.iter_mut().zip(state.samples.drain(..n)) {
            *dst += sample * gain;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.state().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear_count(&self) -> u64 {
        self.state().clears
    }

    pub fn last_clear(&self) -> Option<Instant> {
        self.state().last_clear
    }

    /// Audible (`gain > 0`), recently fed or still draining, and the newest
    /// frame was classified as speech.
    pub fn has_activity(&self, gain: f32) -> bool {
        if gain <= 0.0 {
            return false;
        }
        let now = self.clock.now();
        let state = self.state();
        let recent = state
            .last_append
            .is_some_and(|at| now.saturating_duration_since(at) < self.activity_window);
        (recent || !state.samples.is_empty()) && state.last_voiced
    }
}
