use proxima_client::AudioConfig;
use proxima_client::audio::{BuiltinProcessing, CapturePipeline};
use proxima_core::{AudioFrame, VOICE_BYTES_PER_FRAME, VOICE_SAMPLES_PER_FRAME};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::integration::init_tracing;
use crate::utils::FakeAudioBackend;

fn raw_pipeline(
    backend: &FakeAudioBackend,
    queue: usize,
) -> (CapturePipeline, mpsc::Receiver<AudioFrame>) {
    let (tx, rx) = mpsc::channel(queue);
    let config = AudioConfig {
        denoise: false,
        voice_detection: false,
        ..AudioConfig::default()
    };
    let pipeline = CapturePipeline::new(
        config,
        Arc::new(backend.clone()),
        Arc::new(BuiltinProcessing),
        tx,
    );
    (pipeline, rx)
}

#[test]
fn test_samples_become_voice_frames() {
    init_tracing();
    let backend = FakeAudioBackend::default();
    let (pipeline, mut rx) = raw_pipeline(&backend, 16);
    assert!(!backend.feed(&[0.0; 10]));

    pipeline.set_requested(true).unwrap();
    assert!(backend.feed(&vec![1.0; 1000]));

    let frame = rx.try_recv().unwrap();
    assert_eq!(frame.len(), VOICE_BYTES_PER_FRAME);
    assert!(frame.samples().iter().all(|s| *s == i16::MAX));
    // the 40 leftover samples wait for the next callback
    assert!(rx.try_recv().is_err());

    backend.feed(&vec![-1.0; VOICE_SAMPLES_PER_FRAME - 40]);
    let frame = rx.try_recv().unwrap();
    let samples = frame.samples();
    assert_eq!(samples.len(), VOICE_SAMPLES_PER_FRAME);
    assert_eq!(samples[0], i16::MAX);
    assert_eq!(samples[40], -i16::MAX);

    // without a detector every frame counts as speech
    assert!(pipeline.is_speaking());
    pipeline.set_requested(false).unwrap();
    assert!(!pipeline.is_speaking());
    assert!(!backend.feed(&[0.0; 10]));
}

#[test]
fn test_full_queue_drops_frames() {
    init_tracing();
    let backend = FakeAudioBackend::default();
    let (pipeline, mut rx) = raw_pipeline(&backend, 1);

    pipeline.set_loopback(true).unwrap();
    backend.feed(&vec![0.1; VOICE_SAMPLES_PER_FRAME * 3]);

    assert_eq!(pipeline.dropped_frames(), 2);
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
    assert!(!pipeline.is_transmitting());
    assert!(pipeline.is_loopback());
}

#[test]
fn test_silence_is_not_speech() {
    init_tracing();
    let backend = FakeAudioBackend::default();
    let (tx, mut rx) = mpsc::channel(16);
    let pipeline = CapturePipeline::new(
        AudioConfig::default(),
        Arc::new(backend.clone()),
        Arc::new(BuiltinProcessing),
        tx,
    );

    pipeline.set_requested(true).unwrap();
    backend.feed(&[0.0; VOICE_SAMPLES_PER_FRAME]);
    // silent frames are still sent while transmitting
    assert!(rx.try_recv().is_ok());
    assert!(!pipeline.is_speaking());
}
