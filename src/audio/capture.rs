//! cpal-based microphone capture
//!
//! cpal::Stream is not Send, so the stream lives on a dedicated thread and
//! the async side talks to it over channels. Samples are mixed to mono and
//! resampled to the target rate inside the device callback; the callback is
//! the only writer of the buffer, and ownership of the collected samples
//! transfers exactly once at stop time.

use super::AudioCapture;
use crate::error::AudioError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

/// Supervised close timeout; a driver that does not stop within this is
/// abandoned and logged
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

enum CaptureCommand {
    Stop(oneshot::Sender<Vec<f32>>),
}

/// A running cpal input stream on its own thread
pub struct CpalCapture {
    cmd_tx: Option<std::sync::mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    /// Open `device_name` ("default" for the system default) and start
    /// capturing at `target_rate`.
    pub async fn open(device_name: &str, target_rate: u32) -> Result<Self, AudioError> {
        use cpal::traits::{DeviceTrait, HostTrait};

        let host = cpal::default_host();
        let device = if device_name == "default" {
            host.default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default".to_string()))?
        } else {
            find_input_device(&host, device_name)?
        };

        let device_label = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported_config = device
            .default_input_config()
            .map_err(|e| AudioError::Connection(e.to_string()))?;

        let source_rate = supported_config.sample_rate().0;
        let source_channels = supported_config.channels() as usize;
        let sample_format = supported_config.sample_format();
        tracing::debug!(
            "Opening {}: {} Hz, {} channel(s), {:?}",
            device_label,
            source_rate,
            source_channels,
            sample_format
        );

        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), AudioError>>();

        let thread_handle = thread::spawn(move || {
            use cpal::traits::StreamTrait;

            let stream_config = cpal::StreamConfig {
                channels: supported_config.channels(),
                sample_rate: supported_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
            let err_fn = |err| tracing::error!("Audio stream error: {}", err);

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(
                    &device,
                    &stream_config,
                    samples.clone(),
                    source_rate,
                    target_rate,
                    source_channels,
                    err_fn,
                ),
                cpal::SampleFormat::I16 => build_stream::<i16>(
                    &device,
                    &stream_config,
                    samples.clone(),
                    source_rate,
                    target_rate,
                    source_channels,
                    err_fn,
                ),
                cpal::SampleFormat::U16 => build_stream::<u16>(
                    &device,
                    &stream_config,
                    samples.clone(),
                    source_rate,
                    target_rate,
                    source_channels,
                    err_fn,
                ),
                format => Err(AudioError::StreamError(format!(
                    "Unsupported sample format: {:?}",
                    format
                ))),
            };

            let stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            tracing::debug!("Audio capture thread started");

            if let Ok(CaptureCommand::Stop(response_tx)) = cmd_rx.recv() {
                drop(stream);
                let collected = match samples.lock() {
                    Ok(guard) => guard.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                let _ = response_tx.send(collected);
            }

            tracing::debug!("Audio capture thread stopped");
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                cmd_tx: Some(cmd_tx),
                thread_handle: Some(thread_handle),
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => Err(AudioError::StreamError(
                "capture thread exited before ready".to_string(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl AudioCapture for CpalCapture {
    async fn stop(&mut self) -> Result<Vec<f32>, AudioError> {
        let Some(cmd_tx) = self.cmd_tx.take() else {
            return Err(AudioError::StreamError("already stopped".to_string()));
        };

        let (response_tx, response_rx) = oneshot::channel();
        if cmd_tx.send(CaptureCommand::Stop(response_tx)).is_err() {
            return Err(AudioError::StreamError("capture thread gone".to_string()));
        }

        let samples = match tokio::time::timeout(CLOSE_TIMEOUT, response_rx).await {
            Ok(Ok(samples)) => samples,
            Ok(Err(_)) => return Err(AudioError::StreamError("channel closed".to_string())),
            Err(_) => {
                // Abandon the thread rather than block on a hung driver
                tracing::warn!(
                    "Audio close exceeded {}s, abandoning stream",
                    CLOSE_TIMEOUT.as_secs()
                );
                self.thread_handle.take();
                return Err(AudioError::CloseTimeout(CLOSE_TIMEOUT.as_secs() as u32));
            }
        };

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        if samples.is_empty() {
            return Err(AudioError::EmptyRecording);
        }

        tracing::debug!("Captured {} samples", samples.len());
        Ok(samples)
    }
}

/// Find an input device by exact, case-insensitive, or substring match
fn find_input_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?
        .collect();

    let search_lower = device_name.to_lowercase();
    let mut fallback: Option<usize> = None;

    for (i, device) in devices.iter().enumerate() {
        let Ok(name) = device.name() else { continue };
        if name == device_name {
            return take_device(devices, i);
        }
        if fallback.is_none()
            && (name.to_lowercase() == search_lower || name.to_lowercase().contains(&search_lower))
        {
            fallback = Some(i);
        }
    }

    match fallback {
        Some(i) => take_device(devices, i),
        None => Err(AudioError::DeviceNotFound(device_name.to_string())),
    }
}

fn take_device(mut devices: Vec<cpal::Device>, index: usize) -> Result<cpal::Device, AudioError> {
    Ok(devices.swap_remove(index))
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: Arc<Mutex<Vec<f32>>>,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Mix interleaved channels down to mono
                let mono: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                let resampled = if source_rate != target_rate {
                    resample(&mono, source_rate, target_rate)
                } else {
                    mono
                };

                if let Ok(mut guard) = samples.lock() {
                    guard.extend_from_slice(&resampled);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok(stream)
}

/// Linear interpolation resampling
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let result = resample(&[1.0, 2.0], 8000, 16000);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], 48000, 16000).is_empty());
    }
}
