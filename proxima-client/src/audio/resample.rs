//! Sample-rate conversion for devices that cannot run at the voice rate.

use crate::audio::SampleSource;
use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::SequentialSliceOfVecs;
use proxima_core::{VOICE_SAMPLE_RATE, VOICE_SAMPLES_PER_FRAME};
use rubato::{Fft, FixedSync, Resampler};
use std::collections::VecDeque;
use tracing::warn;

/// 10 ms at the voice rate.
const CHUNK: usize = VOICE_SAMPLES_PER_FRAME / 2;

const MONO: usize = 1;

pub fn needs_resampling(device_rate: u32) -> bool {
    device_rate != VOICE_SAMPLE_RATE
}

/// Mono FFT resampler that accepts any input length and buffers the rest.
pub struct RateConverter {
    resampler: Fft<f32>,
    pending: Vec<f32>,
    work_in: Vec<Vec<f32>>,
    work_out: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Device rate to the voice rate, in 10 ms output chunks.
    pub fn capture(device_rate: u32) -> Result<Self> {
        Self::new(device_rate, VOICE_SAMPLE_RATE, FixedSync::Output)
    }

    /// Voice rate to device rate, in 10 ms input chunks.
    pub fn playback(device_rate: u32) -> Result<Self> {
        Self::new(VOICE_SAMPLE_RATE, device_rate, FixedSync::Input)
    }

    fn new(from: u32, to: u32, fixed: FixedSync) -> Result<Self> {
        let resampler = Fft::<f32>::new(from as usize, to as usize, CHUNK, 1, MONO, fixed)
            .map_err(|e| anyhow!("Failed to create resampler {from} -> {to}: {e}"))?;
        let work_in = vec![vec![0.0; resampler.input_frames_max()]];
        let work_out = vec![vec![0.0; resampler.output_frames_max()]];
        Ok(Self {
            resampler,
            pending: Vec::new(),
            work_in,
            work_out,
        })
    }

    /// Input frames the next conversion step consumes.
    pub fn input_chunk(&self) -> usize {
        self.resampler.input_frames_next()
    }

    /// Appends converted samples to `out`. May append nothing while input accumulates.
    pub fn process(&mut self, samples: &[f32], out: &mut Vec<f32>) -> Result<()> {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            self.work_in[0][..needed].copy_from_slice(&self.pending[..needed]);
            self.pending.drain(..needed);

            let input = SequentialSliceOfVecs::new(&self.work_in[..], MONO, needed)
                .map_err(|e| anyhow!("Resampler input: {e}"))?;
            let produced = self.resampler.output_frames_next();
            let mut output = SequentialSliceOfVecs::new_mut(&mut self.work_out[..], MONO, produced)
                .map_err(|e| anyhow!("Resampler output: {e}"))?;
            let (_, written) = self
                .resampler
                .process_into_buffer(&input, &mut output, None)
                .map_err(|e| anyhow!("Resampler: {e}"))?;
            out.extend_from_slice(&self.work_out[0][..written]);
        }
        Ok(())
    }
}

/// Feeds a device running at another rate from a voice-rate [`SampleSource`],
/// pulling one chunk at a time so the source advances at real time.
pub struct PlaybackResampler {
    converter: RateConverter,
    voice: Vec<f32>,
    converted: Vec<f32>,
    ready: VecDeque<f32>,
}

impl PlaybackResampler {
    pub fn new(device_rate: u32) -> Result<Self> {
        Ok(Self {
            converter: RateConverter::playback(device_rate)?,
            voice: Vec::with_capacity(CHUNK),
            converted: Vec::new(),
            ready: VecDeque::new(),
        })
    }

    /// Fills `out` with device-rate samples; any shortfall is silence.
    pub fn fill(&mut self, source: &dyn SampleSource, out: &mut [f32]) {
        while self.ready.len() < out.len() {
            self.voice.clear();
            self.voice.resize(self.converter.input_chunk(), 0.0);
            source.fill(&mut self.voice);

            self.converted.clear();
            if let Err(e) = self.converter.process(&self.voice, &mut self.converted) {
                warn!("Playback resampling failed: {e:#}");
                break;
            }
            if self.converted.is_empty() {
                break;
            }
            self.ready.extend(self.converted.iter().copied());
        }

        let available = self.ready.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(self.ready.drain(..available)) {
            *slot = sample;
        }
        out[available..].fill(0.0);
    }
}
