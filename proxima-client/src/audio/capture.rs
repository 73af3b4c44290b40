use crate::audio::{
    AudioBackend, DeviceHandle, NoiseSuppressor, ProcessingFactory, VoiceDetector, f32_to_pcm16,
};
use crate::{AudioConfig, ClientError};
use proxima_core::{AudioFrame, VOICE_SAMPLES_PER_FRAME};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Open,
    Close,
}

/// Decides whether the input device should be open. Each setter reports the
/// device transition it causes, if any, so a caller issues exactly one
/// open or close per change of the derived flag.
#[derive(Debug, Default, Clone)]
pub struct CaptureGate {
    requested: bool,
    muted: bool,
    deafened: bool,
    loopback: bool,
    open: bool,
}

impl CaptureGate {
    pub fn should_capture(&self) -> bool {
        self.transmitting() || self.loopback
    }

    /// Captured audio goes to peers only in this state; loopback alone stays local.
    pub fn transmitting(&self) -> bool {
        self.requested && !self.muted && !self.deafened
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_loopback(&self) -> bool {
        self.loopback
    }

    fn settle(&mut self) -> Option<GateTransition> {
        match (self.should_capture(), self.open) {
            (true, false) => {
                self.open = true;
                Some(GateTransition::Open)
            }
            (false, true) => {
                self.open = false;
                Some(GateTransition::Close)
            }
            _ => None,
        }
    }

    pub fn set_requested(&mut self, requested: bool) -> Option<GateTransition> {
        self.requested = requested;
        self.settle()
    }

    pub fn set_muted(&mut self, muted: bool) -> Option<GateTransition> {
        self.muted = muted;
        self.settle()
    }

    pub fn set_deafened(&mut self, deafened: bool) -> Option<GateTransition> {
        self.deafened = deafened;
        self.settle()
    }

    pub fn set_loopback(&mut self, loopback: bool) -> Option<GateTransition> {
        self.loopback = loopback;
        self.settle()
    }

    /// The device failed to open; the gate is closed again.
    fn open_failed(&mut self) {
        self.open = false;
    }
}

/// Cuts the callback's sample stream into voice frames, runs the processing
/// stages and hands frames off without blocking.
struct FrameAssembler {
    pending: Vec<f32>,
    suppressor: Option<Box<dyn NoiseSuppressor>>,
    detector: Option<Box<dyn VoiceDetector>>,
    frames: mpsc::Sender<AudioFrame>,
    speaking: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl FrameAssembler {
    fn push(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= VOICE_SAMPLES_PER_FRAME {
            let mut frame: Vec<f32> = self.pending.drain(..VOICE_SAMPLES_PER_FRAME).collect();
            if let Some(suppressor) = self.suppressor.as_mut() {
                suppressor.process(&mut frame);
            }
            let voiced = self
                .detector
                .as_mut()
                .is_none_or(|detector| detector.is_voiced(&frame));
            self.speaking.store(voiced, Ordering::Relaxed);

            let frame = AudioFrame::from_samples(&f32_to_pcm16(&frame));
            if self.frames.try_send(frame).is_err() {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    debug!("Capture queue full, {} frames dropped so far", dropped);
                }
            }
        }
    }
}

struct CaptureState {
    gate: CaptureGate,
    device: Option<Box<dyn DeviceHandle>>,
}

/// Microphone capture driven by [`CaptureGate`]. Frames leave through a bounded
/// channel; a full channel drops frames rather than stalling the device.
pub struct CapturePipeline {
    config: AudioConfig,
    backend: Arc<dyn AudioBackend>,
    processing: Arc<dyn ProcessingFactory>,
    frames: mpsc::Sender<AudioFrame>,
    state: Mutex<CaptureState>,
    speaking: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl CapturePipeline {
    pub fn new(
        config: AudioConfig,
        backend: Arc<dyn AudioBackend>,
        processing: Arc<dyn ProcessingFactory>,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Self {
        Self {
            config,
            backend,
            processing,
            frames,
            state: Mutex::new(CaptureState {
                gate: CaptureGate::default(),
                device: None,
            }),
            speaking: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_requested(&self, requested: bool) -> Result<(), ClientError> {
        self.update(|gate| gate.set_requested(requested))
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), ClientError> {
        self.update(|gate| gate.set_muted(muted))
    }

    pub fn set_deafened(&self, deafened: bool) -> Result<(), ClientError> {
        self.update(|gate| gate.set_deafened(deafened))
    }

    pub fn set_loopback(&self, loopback: bool) -> Result<(), ClientError> {
        self.update(|gate| gate.set_loopback(loopback))
    }

    /// Closes the device whatever the gate inputs were.
    pub fn shutdown(&self) {
        let _ = self.update(|gate| {
            let first = gate.set_requested(false);
            let second = gate.set_loopback(false);
            first.or(second)
        });
    }

    fn update(
        &self,
        change: impl FnOnce(&mut CaptureGate) -> Option<GateTransition>,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        match change(&mut state.gate) {
            Some(GateTransition::Open) => match self.open_device() {
                Ok(device) => {
                    state.device = Some(device);
                    info!("Capture started");
                }
                Err(e) => {
                    state.gate.open_failed();
                    error!("Failed to start capture: {}", e);
                    return Err(e);
                }
            },
            Some(GateTransition::Close) => {
                if let Some(device) = state.device.take() {
                    device.close();
                }
                self.speaking.store(false, Ordering::Relaxed);
                info!("Capture stopped");
            }
            None => {}
        }
        Ok(())
    }

    fn open_device(&self) -> Result<Box<dyn DeviceHandle>, ClientError> {
        // built fresh per start so no filter state crosses a restart
        let suppressor = if self.config.denoise {
            Some(
                self.processing
                    .suppressor()
                    .map_err(|e| ClientError::AudioDevice(format!("{e:#}")))?,
            )
        } else {
            None
        };
        let detector = if self.config.voice_detection {
            Some(
                self.processing
                    .detector()
                    .map_err(|e| ClientError::AudioDevice(format!("{e:#}")))?,
            )
        } else {
            None
        };

        let mut assembler = FrameAssembler {
            pending: Vec::with_capacity(VOICE_SAMPLES_PER_FRAME * 2),
            suppressor,
            detector,
            frames: self.frames.clone(),
            speaking: self.speaking.clone(),
            dropped: self.dropped.clone(),
        };
        self.backend.open_input(
            self.config.input_device,
            Box::new(move |samples| assembler.push(samples)),
        )
    }

    pub fn is_capturing(&self) -> bool {
        self.state().gate.is_open()
    }

    pub fn is_transmitting(&self) -> bool {
        self.state().gate.transmitting()
    }

    pub fn is_loopback(&self) -> bool {
        self.state().gate.is_loopback()
    }

    pub fn is_speaking(&self) -> bool {
        self.is_capturing() && self.speaking.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
