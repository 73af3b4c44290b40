//! WebRTC audio-processing backed stages, enabled by the `webrtc-apm` feature.

use crate::audio::{NoiseSuppressor, ProcessingFactory, VoiceDetector};
use anyhow::{Result, anyhow};
use tracing::debug;
use webrtc_audio_processing::{
    Config, GainControl, GainControlMode, InitializationConfig, NoiseSuppression,
    NoiseSuppressionLevel, Processor, VoiceDetection, VoiceDetectionLikelihood,
};

/// The processor only accepts 10 ms frames; a 20 ms voice frame is two of them.
const APM_FRAME: usize = 480;

fn processor(config: Config) -> Result<Processor> {
    let init = InitializationConfig {
        num_capture_channels: 1,
        num_render_channels: 1,
        ..InitializationConfig::default()
    };
    let mut processor =
        Processor::new(&init).map_err(|e| anyhow!("Failed to create audio processor: {e}"))?;
    processor.set_config(config);
    Ok(processor)
}

fn detection() -> Option<VoiceDetection> {
    Some(VoiceDetection {
        detection_likelihood: VoiceDetectionLikelihood::High,
    })
}

/// Runs `samples` through the processor in 10 ms slices and reports whether
/// any slice carried voice. A trailing partial slice is left untouched.
fn run(processor: &mut Processor, samples: &mut [f32]) -> bool {
    let mut voiced = false;
    for chunk in samples.chunks_exact_mut(APM_FRAME) {
        match processor.process_capture_frame(chunk) {
            Ok(()) => voiced |= processor.get_stats().has_voice.unwrap_or(false),
            Err(e) => debug!("Audio processor rejected frame: {e}"),
        }
    }
    voiced
}

pub struct ApmSuppressor {
    processor: Processor,
}

impl NoiseSuppressor for ApmSuppressor {
    fn process(&mut self, samples: &mut [f32]) {
        run(&mut self.processor, samples);
    }
}

pub struct ApmDetector {
    processor: Processor,
    scratch: Vec<f32>,
}

impl VoiceDetector for ApmDetector {
    fn is_voiced(&mut self, samples: &[f32]) -> bool {
        self.scratch.clear();
        self.scratch.extend_from_slice(samples);
        run(&mut self.processor, &mut self.scratch)
    }
}

/// Noise suppression with adaptive gain, plus the processor's own VAD.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApmProcessing;

impl ProcessingFactory for ApmProcessing {
    fn suppressor(&self) -> Result<Box<dyn NoiseSuppressor>> {
        let processor = processor(Config {
            echo_cancellation: None,
            gain_control: Some(GainControl {
                mode: GainControlMode::AdaptiveDigital,
                target_level_dbfs: 3,
                compression_gain_db: 9,
                enable_limiter: true,
            }),
            noise_suppression: Some(NoiseSuppression {
                suppression_level: NoiseSuppressionLevel::Moderate,
            }),
            voice_detection: detection(),
            enable_transient_suppressor: false,
            enable_high_pass_filter: true,
        })?;
        Ok(Box::new(ApmSuppressor { processor }))
    }

    fn detector(&self) -> Result<Box<dyn VoiceDetector>> {
        let processor = processor(Config {
            echo_cancellation: None,
            gain_control: None,
            noise_suppression: None,
            voice_detection: detection(),
            enable_transient_suppressor: false,
            enable_high_pass_filter: false,
        })?;
        Ok(Box::new(ApmDetector {
            processor,
            scratch: Vec::with_capacity(APM_FRAME * 2),
        }))
    }
}
