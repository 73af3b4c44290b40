//! Physical audio devices. Each open device lives on its own worker thread,
//! since cpal streams cannot move between threads.

use crate::ClientError;
use crate::audio::{PlaybackResampler, RateConverter, needs_resampling};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
    SupportedStreamConfig, SupportedStreamConfigRange,
};
use proxima_core::VOICE_SAMPLE_RATE;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Receives mono samples at the voice rate from the capture callback.
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send>;

/// Produces mono output samples. Called from the output callback, so it must
/// never wait on the network.
pub trait SampleSource: Send + Sync {
    fn fill(&self, out: &mut [f32]);
}

/// An open device. Closing stops the stream and releases the device.
pub trait DeviceHandle: Send {
    fn close(self: Box<Self>);
}

pub trait AudioBackend: Send + Sync {
    fn input_devices(&self) -> Vec<String>;

    fn output_devices(&self) -> Vec<String>;

    /// `device` indexes [`AudioBackend::input_devices`]; `None` is the host default.
    fn open_input(
        &self,
        device: Option<usize>,
        on_samples: SampleCallback,
    ) -> Result<Box<dyn DeviceHandle>, ClientError>;

    fn open_output(
        &self,
        device: Option<usize>,
        source: Arc<dyn SampleSource>,
    ) -> Result<Box<dyn DeviceHandle>, ClientError>;
}

fn device_error(context: &str, err: impl std::fmt::Display) -> ClientError {
    ClientError::AudioDevice(format!("{context}: {err}"))
}

fn device_names<I: Iterator<Item = Device>>(devices: Result<I, cpal::DevicesError>) -> Vec<String> {
    match devices {
        Ok(devices) => devices
            .filter_map(|d| d.description().ok().map(|desc| desc.name().to_string()))
            .collect(),
        Err(e) => {
            warn!("Failed to enumerate audio devices: {}", e);
            Vec::new()
        }
    }
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Picks a configuration running at the voice rate, fewest channels and
/// float samples first. Without one the device default is kept at its own rate.
fn voice_config(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    fallback: SupportedStreamConfig,
) -> SupportedStreamConfig {
    ranges
        .filter(|c| {
            c.min_sample_rate() <= VOICE_SAMPLE_RATE && c.max_sample_rate() >= VOICE_SAMPLE_RATE
        })
        .filter_map(|c| format_rank(c.sample_format()).map(|rank| (c.channels(), rank, c)))
        .min_by_key(|(channels, rank, _)| (*channels, *rank))
        .map(|(_, _, c)| c.with_sample_rate(VOICE_SAMPLE_RATE))
        .unwrap_or(fallback)
}

/// The host's default audio API through cpal.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn input_devices(&self) -> Vec<String> {
        device_names(cpal::default_host().input_devices())
    }

    fn output_devices(&self) -> Vec<String> {
        device_names(cpal::default_host().output_devices())
    }

    fn open_input(
        &self,
        device: Option<usize>,
        on_samples: SampleCallback,
    ) -> Result<Box<dyn DeviceHandle>, ClientError> {
        AudioWorker::spawn("proxima-capture", move || {
            let host = cpal::default_host();
            let device = match device {
                Some(index) => host
                    .input_devices()
                    .map_err(|e| device_error("Failed to list input devices", e))?
                    .nth(index)
                    .ok_or_else(|| ClientError::AudioDevice(format!("no input device {index}")))?,
                None => host
                    .default_input_device()
                    .ok_or_else(|| ClientError::AudioDevice("no default input device".to_owned()))?,
            };
            let fallback = device
                .default_input_config()
                .map_err(|e| device_error("Failed to query input config", e))?;
            let supported = match device.supported_input_configs() {
                Ok(ranges) => voice_config(ranges, fallback),
                Err(e) => {
                    debug!("Failed to list input configs, using the default: {}", e);
                    fallback
                }
            };
            let config = supported.config();
            let converter = if needs_resampling(config.sample_rate) {
                info!("Input runs at {} Hz, resampling to the voice rate", config.sample_rate);
                Some(
                    RateConverter::capture(config.sample_rate)
                        .map_err(|e| device_error("Failed to set up input resampling", e))?,
                )
            } else {
                None
            };

            let stream = match supported.sample_format() {
                SampleFormat::F32 => build_input::<f32>(&device, &config, converter, on_samples),
                SampleFormat::I16 => build_input::<i16>(&device, &config, converter, on_samples),
                SampleFormat::U16 => build_input::<u16>(&device, &config, converter, on_samples),
                other => Err(ClientError::AudioDevice(format!(
                    "unsupported input sample format {other:?}"
                ))),
            }?;
            stream
                .play()
                .map_err(|e| device_error("Failed to start input stream", e))?;
            Ok(stream)
        })
    }

    fn open_output(
        &self,
        device: Option<usize>,
        source: Arc<dyn SampleSource>,
    ) -> Result<Box<dyn DeviceHandle>, ClientError> {
        AudioWorker::spawn("proxima-playback", move || {
            let host = cpal::default_host();
            let device = match device {
                Some(index) => host
                    .output_devices()
                    .map_err(|e| device_error("Failed to list output devices", e))?
                    .nth(index)
                    .ok_or_else(|| ClientError::AudioDevice(format!("no output device {index}")))?,
                None => host
                    .default_output_device()
                    .ok_or_else(|| ClientError::AudioDevice("no default output device".to_owned()))?,
            };
            let fallback = device
                .default_output_config()
                .map_err(|e| device_error("Failed to query output config", e))?;
            let supported = match device.supported_output_configs() {
                Ok(ranges) => voice_config(ranges, fallback),
                Err(e) => {
                    debug!("Failed to list output configs, using the default: {}", e);
                    fallback
                }
            };
            let config = supported.config();
            let resampler = if needs_resampling(config.sample_rate) {
                info!("Output runs at {} Hz, resampling from the voice rate", config.sample_rate);
                Some(
                    PlaybackResampler::new(config.sample_rate)
                        .map_err(|e| device_error("Failed to set up output resampling", e))?,
                )
            } else {
                None
            };

            let stream = match supported.sample_format() {
                SampleFormat::F32 => build_output::<f32>(&device, &config, resampler, source),
                SampleFormat::I16 => build_output::<i16>(&device, &config, resampler, source),
                SampleFormat::U16 => build_output::<u16>(&device, &config, resampler, source),
                other => Err(ClientError::AudioDevice(format!(
                    "unsupported output sample format {other:?}"
                ))),
            }?;
            stream
                .play()
                .map_err(|e| device_error("Failed to start output stream", e))?;
            Ok(stream)
        })
    }
}

/// Downmixes interleaved input to mono, converting to the voice rate when
/// the device runs at another one, before handing it on.
fn build_input<T>(
    device: &Device,
    config: &StreamConfig,
    mut converter: Option<RateConverter>,
    mut on_samples: SampleCallback,
) -> Result<Stream, ClientError>
where
    T: Sample + SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let mut mono: Vec<f32> = Vec::new();
    let mut converted: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>() / frame.len() as f32
                }));
                let Some(converter) = converter.as_mut() else {
                    on_samples(&mono);
                    return;
                };
                converted.clear();
                match converter.process(&mono, &mut converted) {
                    Ok(()) if !converted.is_empty() => on_samples(&converted),
                    Ok(()) => {}
                    Err(e) => warn!("Capture resampling failed: {e:#}"),
                }
            },
            |err| warn!("Audio capture error: {}", err),
            None,
        )
        .map_err(|e| device_error("Failed to build input stream", e))
}

/// Writes the mono mix to every output channel.
fn build_output<T>(
    device: &Device,
    config: &StreamConfig,
    mut resampler: Option<PlaybackResampler>,
    source: Arc<dyn SampleSource>,
) -> Result<Stream, ClientError>
where
    T: Sample + SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels.max(1));
    let mut mono: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mono.clear();
                mono.resize(data.len() / channels, 0.0);
                match resampler.as_mut() {
                    Some(resampler) => resampler.fill(source.as_ref(), &mut mono),
                    None => source.fill(&mut mono),
                }
                for (frame, sample) in data.chunks_exact_mut(channels).zip(&mono) {
                    let value = T::from_sample(*sample);
                    frame.fill(value);
                }
            },
            |err| warn!("Audio playback error: {}", err),
            None,
        )
        .map_err(|e| device_error("Failed to build output stream", e))
}

/// Owns one stream on a dedicated thread until closed.
struct AudioWorker {
    stop_tx: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl AudioWorker {
    fn spawn<F>(name: &str, build: F) -> Result<Box<dyn DeviceHandle>, ClientError>
    where
        F: FnOnce() -> Result<Stream, ClientError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let thread_name = name.to_owned();

        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // parked until close() or the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Audio worker {} stopped", thread_name);
            })
            .map_err(|e| device_error("Failed to spawn audio thread", e))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(AudioWorker {
                stop_tx,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(ClientError::AudioDevice(
                "audio thread exited during startup".to_owned(),
            )),
        }
    }
}

impl DeviceHandle for AudioWorker {
    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
