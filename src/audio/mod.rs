//! Audio capture port
//!
//! Owns one microphone input stream at a time. Frames are buffered from the
//! device callback; stopping concatenates them into a single linear-PCM
//! buffer for WAV encoding. Closing is bounded in time so a hung audio
//! driver cannot stall the session machine.

pub mod capture;

use crate::config::AudioConfig;
use crate::error::AudioError;

/// Attempts made to open a device before giving up; retries fall back to
/// the default device
pub const OPEN_ATTEMPTS: u32 = 3;

/// A live microphone stream
#[async_trait::async_trait]
pub trait AudioCapture: Send {
    /// Stop the stream and return the captured samples (mono, f32, at the
    /// configured sample rate). Bounded in time; a hung driver yields
    /// [`AudioError::CloseTimeout`] and the stream is abandoned.
    async fn stop(&mut self) -> Result<Vec<f32>, AudioError>;
}

/// Factory for opening capture streams; mockable for session tests
#[async_trait::async_trait]
pub trait CapturePort: Send + Sync {
    async fn open(&self) -> Result<Box<dyn AudioCapture>, AudioError>;
}

/// cpal-backed capture port with bounded open retries
pub struct CpalPort {
    config: AudioConfig,
}

impl CpalPort {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait::async_trait]
impl CapturePort for CpalPort {
    /// Open the configured device, retrying up to [`OPEN_ATTEMPTS`] times.
    /// From the second attempt on, the default device is used instead of
    /// the configured one.
    async fn open(&self) -> Result<Box<dyn AudioCapture>, AudioError> {
        let mut last = String::new();
        for attempt in 1..=OPEN_ATTEMPTS {
            let device = if attempt == 1 {
                self.config.device.as_str()
            } else {
                "default"
            };
            match capture::CpalCapture::open(device, self.config.sample_rate).await {
                Ok(capture) => return Ok(Box::new(capture)),
                Err(e) => {
                    tracing::warn!(
                        "Device open attempt {}/{} ({}) failed: {}",
                        attempt,
                        OPEN_ATTEMPTS,
                        device,
                        e
                    );
                    last = e.to_string();
                }
            }
        }
        Err(AudioError::OpenFailed {
            attempts: OPEN_ATTEMPTS,
            last,
        })
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Capture that returns a canned sample buffer on stop
    pub struct MockCapture {
        pub samples: Vec<f32>,
        pub stopped: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl AudioCapture for MockCapture {
        async fn stop(&mut self) -> Result<Vec<f32>, AudioError> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(std::mem::take(&mut self.samples))
        }
    }

    /// Port that fails the first `fail_opens` open calls, then succeeds
    /// with `samples`-long buffers
    pub struct MockPort {
        pub fail_opens: u32,
        pub samples: Vec<f32>,
        pub opens: Arc<AtomicU32>,
        pub stops: Arc<AtomicU32>,
    }

    impl MockPort {
        pub fn working(samples: Vec<f32>) -> Self {
            Self {
                fail_opens: 0,
                samples,
                opens: Arc::new(AtomicU32::new(0)),
                stops: Arc::new(AtomicU32::new(0)),
            }
        }

        pub fn broken() -> Self {
            Self {
                fail_opens: u32::MAX,
                samples: Vec::new(),
                opens: Arc::new(AtomicU32::new(0)),
                stops: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl CapturePort for MockPort {
        async fn open(&self) -> Result<Box<dyn AudioCapture>, AudioError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_opens {
                return Err(AudioError::OpenFailed {
                    attempts: OPEN_ATTEMPTS,
                    last: "mock device busy".to_string(),
                });
            }
            Ok(Box::new(MockCapture {
                samples: self.samples.clone(),
                stopped: self.stops.clone(),
            }))
        }
    }
}
