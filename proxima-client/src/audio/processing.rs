//! Per-frame noise suppression and voice activity detection.
//!
//! Both stages work on normalized `f32` samples at the voice rate. A fresh
//! suppressor is built every time capture starts, so no filter state leaks
//! across sessions.

use anyhow::Result;

/// Stateful in-place denoiser for one capture session.
pub trait NoiseSuppressor: Send {
    fn process(&mut self, samples: &mut [f32]);
}

/// Classifies frames as speech or not.
pub trait VoiceDetector: Send {
    fn is_voiced(&mut self, samples: &[f32]) -> bool;
}

/// Builds processing stages. Shared between capture and the playback mixer so
/// both sides classify speech with the same detector family.
pub trait ProcessingFactory: Send + Sync {
    fn suppressor(&self) -> Result<Box<dyn NoiseSuppressor>>;

    fn detector(&self) -> Result<Box<dyn VoiceDetector>>;
}

pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|s| f32::from(*s) / 32_768.0).collect()
}

pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * 32_767.0).round() as i16)
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Fraction of adjacent sample pairs that change sign.
fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

/// Downward expander that tracks the background level and attenuates frames
/// sitting close to it.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    noise_floor: f32,
    /// Frames louder than `noise_floor * open_ratio` pass untouched.
    open_ratio: f32,
    closed_gain: f32,
    /// Current smoothed gain, ramps toward the target to avoid clicks.
    gain: f32,
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self {
            noise_floor: 0.002,
            open_ratio: 3.0,
            closed_gain: 0.1,
            gain: 1.0,
        }
    }
}

impl NoiseGate {
    const FLOOR_RISE: f32 = 0.01;
    const FLOOR_FALL: f32 = 0.2;
    const MIN_FLOOR: f32 = 1e-4;

    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }
}

impl NoiseSuppressor for NoiseGate {
    fn process(&mut self, samples: &mut [f32]) {
        let level = rms(samples);

        // the floor falls quickly and rises slowly, so speech barely moves it
        let rate = if level < self.noise_floor {
            Self::FLOOR_FALL
        } else {
            Self::FLOOR_RISE
        };
        self.noise_floor = (self.noise_floor + rate * (level - self.noise_floor)).max(Self::MIN_FLOOR);

        let target = if level > self.noise_floor * self.open_ratio {
            1.0
        } else {
            self.closed_gain
        };

        let len = samples.len().max(1) as f32;
        let start = self.gain;
        for (i, sample) in samples.iter_mut().enumerate() {
            let g = start + (target - start) * (i as f32 + 1.0) / len;
            *sample *= g;
        }
        self.gain = target;
    }
}

/// Energy plus zero-crossing detector with a hangover so word endings are not clipped.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold: f32,
    max_zero_crossings: f32,
    hangover_frames: u32,
    remaining: u32,
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.01, 0.35, 8)
    }
}

impl EnergyVad {
    pub fn new(threshold: f32, max_zero_crossings: f32, hangover_frames: u32) -> Self {
        Self {
            threshold,
            max_zero_crossings,
            hangover_frames,
            remaining: 0,
        }
    }
}

impl VoiceDetector for EnergyVad {
    fn is_voiced(&mut self, samples: &[f32]) -> bool {
        // hiss is loud but crosses zero far more often than voiced speech
        let voiced = rms(samples) >= self.threshold
            && zero_crossing_rate(samples) <= self.max_zero_crossings;
        if voiced {
            self.remaining = self.hangover_frames;
            return true;
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            return true;
        }
        false
    }
}

/// Pure in-crate processing: [`NoiseGate`] and [`EnergyVad`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinProcessing;

impl ProcessingFactory for BuiltinProcessing {
    fn suppressor(&self) -> Result<Box<dyn NoiseSuppressor>> {
        Ok(Box::new(NoiseGate::default()))
    }

    fn detector(&self) -> Result<Box<dyn VoiceDetector>> {
        Ok(Box::new(EnergyVad::default()))
    }
}
