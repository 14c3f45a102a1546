//! Microphone capture using cpal
//!
//! Device enumeration plus the microphone source that feeds f32 PCM into
//! the coordinator. The stream lives on a dedicated thread because
//! `cpal::Stream` is not `Send`.

use crate::capture;
use crate::capture::traits::{AudioDeviceInfo, CaptureSource};
use crate::recorder::coordinator::SessionCoordinator;
use crate::recorder::sample::MediaSample;
use crate::recorder::sink::{RecorderError, RecorderResult};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Get the list of available audio input devices.
pub fn get_audio_input_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let is_default = default_name.as_ref() == Some(&name);
                devices.push(AudioDeviceInfo {
                    id: name.clone(),
                    name,
                    is_default,
                });
            }
        }
    }

    devices
}

fn input_device(device_id: Option<&str>) -> Option<Device> {
    let host = cpal::default_host();
    match device_id {
        Some(wanted) => {
            if let Ok(devices) = host.input_devices() {
                for device in devices {
                    if device.name().map(|name| name == wanted).unwrap_or(false) {
                        return Some(device);
                    }
                }
            }
            None
        }
        None => host.default_input_device(),
    }
}

/// Sample rate and channel count the device will deliver, used to open
/// the audio sink input with a matching format.
pub fn default_stream_format(device_id: Option<&str>) -> RecorderResult<(u32, u16)> {
    let device = input_device(device_id).ok_or_else(|| {
        RecorderError::SinkInitFailure("no audio input device available".to_string())
    })?;
    let config = device.default_input_config().map_err(|e| {
        RecorderError::SinkInitFailure(format!("failed to query audio input config: {e}"))
    })?;
    Ok((config.sample_rate().0, config.channels()))
}

/// Microphone capture source.
pub struct MicrophoneSource {
    id: String,
    device_id: Option<String>,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneSource {
    /// If `device_id` is None, the default input device is used.
    pub fn new(device_id: Option<String>) -> Self {
        Self {
            id: "microphone".to_string(),
            device_id,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

#[async_trait]
impl CaptureSource for MicrophoneSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&mut self, session: Arc<SessionCoordinator>) -> RecorderResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let device_id = self.device_id.clone();
        let running = self.running.clone();

        let handle = std::thread::spawn(move || {
            let Some(device) = input_device(device_id.as_deref()) else {
                session.abort("microphone device is no longer available");
                return;
            };
            let config = match device.default_input_config() {
                Ok(config) => config,
                Err(e) => {
                    session.abort(&format!("failed to configure microphone: {e}"));
                    return;
                }
            };

            let sample_format = config.sample_format();
            let stream_config: StreamConfig = config.into();
            let sample_rate = stream_config.sample_rate.0;
            let channels = stream_config.channels;

            tracing::info!(
                "Microphone stream: format={:?}, {}Hz, {}ch",
                sample_format,
                sample_rate,
                channels
            );

            let error_fn = |err| tracing::error!("Microphone stream error: {}", err);

            let stream = match sample_format {
                SampleFormat::F32 => {
                    let session = session.clone();
                    let running = running.clone();
                    device.build_input_stream(
                        &stream_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            if !running.load(Ordering::Relaxed) {
                                return;
                            }
                            let bytes: Vec<u8> = data
                                .iter()
                                .flat_map(|&sample| sample.to_le_bytes())
                                .collect();
                            session.ingest(MediaSample::audio(
                                capture::process_time_ms(),
                                batch_duration_ms(data.len(), channels, sample_rate),
                                bytes,
                            ));
                        },
                        error_fn,
                        None,
                    )
                }
                SampleFormat::I16 => {
                    let session = session.clone();
                    let running = running.clone();
                    device.build_input_stream(
                        &stream_config,
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            if !running.load(Ordering::Relaxed) {
                                return;
                            }
                            let bytes: Vec<u8> = data
                                .iter()
                                .flat_map(|&sample| {
                                    (sample as f32 / i16::MAX as f32).to_le_bytes()
                                })
                                .collect();
                            session.ingest(MediaSample::audio(
                                capture::process_time_ms(),
                                batch_duration_ms(data.len(), channels, sample_rate),
                                bytes,
                            ));
                        },
                        error_fn,
                        None,
                    )
                }
                SampleFormat::U16 => {
                    let session = session.clone();
                    let running = running.clone();
                    device.build_input_stream(
                        &stream_config,
                        move |data: &[u16], _: &cpal::InputCallbackInfo| {
                            if !running.load(Ordering::Relaxed) {
                                return;
                            }
                            let bytes: Vec<u8> = data
                                .iter()
                                .flat_map(|&sample| {
                                    ((sample as f32 / u16::MAX as f32) * 2.0 - 1.0).to_le_bytes()
                                })
                                .collect();
                            session.ingest(MediaSample::audio(
                                capture::process_time_ms(),
                                batch_duration_ms(data.len(), channels, sample_rate),
                                bytes,
                            ));
                        },
                        error_fn,
                        None,
                    )
                }
                other => {
                    session.abort(&format!("unsupported microphone sample format {other:?}"));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    session.abort(&format!("failed to open microphone stream: {e}"));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                session.abort(&format!("failed to start microphone stream: {e}"));
                return;
            }

            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
            tracing::info!("Microphone capture thread stopped");
        });

        self.thread = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn batch_duration_ms(samples: usize, channels: u16, sample_rate: u32) -> f64 {
    if channels == 0 || sample_rate == 0 {
        return 0.0;
    }
    (samples as f64 / channels as f64) / sample_rate as f64 * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_duration_covers_interleaved_frames() {
        // 480 interleaved stereo samples at 48kHz = 5ms of audio.
        let ms = batch_duration_ms(480, 2, 48000);
        assert!((ms - 5.0).abs() < 1e-9);
    }

    #[test]
    fn batch_duration_handles_degenerate_configs() {
        assert_eq!(batch_duration_ms(480, 0, 48000), 0.0);
        assert_eq!(batch_duration_ms(480, 2, 0), 0.0);
    }
}
