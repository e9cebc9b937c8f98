//! Transcription server client
//!
//! All HTTP access to the local transcription server lives here: settings
//! and health polling (short timeout), the transcribe call (generous
//! timeout), and the best-effort status/log broadcasts whose failures are
//! swallowed. The client also owns the health state and publishes it
//! through a watch channel, logging only edge transitions.
//!
//! ureq is blocking; callers on the async side wrap calls in
//! `spawn_blocking`.

use crate::config::ServerSettings;
use crate::error::ServerError;
use serde::Deserialize;
use std::io::Cursor;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use ureq::serde_json;

/// Timeout for settings/health/status/log calls
const SHORT_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for the transcribe call; inference can be slow
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Server and provider health as last observed
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub server_healthy: bool,
    pub provider_available: bool,
    pub last_checked_at: SystemTime,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            server_healthy: false,
            provider_available: false,
            last_checked_at: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Successful transcription response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub processing_time: Option<f64>,
}

/// GET /api/health response body
#[derive(Debug, Clone, Deserialize)]
struct HealthResponse {
    #[serde(default, rename = "serverHealthy")]
    server_healthy: Option<bool>,
    #[serde(default, rename = "providerAvailable")]
    provider_available: bool,
    #[serde(default, rename = "currentProvider")]
    current_provider: Option<String>,
}

/// Anything that can turn a sample buffer into a transcription.
///
/// [`ServerClient`] is the production implementation; tests substitute a
/// deterministic fake so the session machine can be exercised without a
/// server.
pub trait Transcriber: Send + Sync {
    fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        language: Option<&str>,
    ) -> Result<Transcription, ServerError>;
}

impl Transcriber for ServerClient {
    fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        language: Option<&str>,
    ) -> Result<Transcription, ServerError> {
        ServerClient::transcribe(self, samples, sample_rate, language)
    }
}

/// Client for the local transcription server
pub struct ServerClient {
    base_url: String,
    health_tx: watch::Sender<HealthStatus>,
}

impl ServerClient {
    pub fn new(base_url: &str) -> Self {
        let (health_tx, _) = watch::channel(HealthStatus::default());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            health_tx,
        }
    }

    /// Subscribe to health state changes
    pub fn health(&self) -> watch::Receiver<HealthStatus> {
        self.health_tx.subscribe()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Record a health observation, logging only on edge transitions
    /// (healthy -> unhealthy and back) to avoid log spam.
    fn record_health(&self, server_healthy: bool, provider_available: bool) {
        self.health_tx.send_modify(|current| {
            if current.server_healthy && !server_healthy {
                tracing::warn!("Transcription server became unreachable");
            } else if !current.server_healthy && server_healthy {
                tracing::info!("Transcription server is healthy");
            }
            if server_healthy && current.provider_available != provider_available {
                if provider_available {
                    tracing::info!("Transcription provider available");
                } else {
                    tracing::warn!("Transcription provider unavailable");
                }
            }
            current.server_healthy = server_healthy;
            current.provider_available = provider_available;
            current.last_checked_at = SystemTime::now();
        });
    }

    /// GET /api/settings (short timeout)
    pub fn fetch_settings(&self) -> Result<ServerSettings, ServerError> {
        let response = ureq::get(&self.url("/api/settings"))
            .timeout(SHORT_TIMEOUT)
            .call()
            .map_err(map_ureq_error)?;

        let settings: ServerSettings = response
            .into_json()
            .map_err(|e| ServerError::Protocol(format!("settings response: {}", e)))?;
        Ok(settings)
    }

    /// GET /api/health (short timeout); updates the health watch either way
    pub fn check_health(&self) -> Result<HealthStatus, ServerError> {
        let result = ureq::get(&self.url("/api/health"))
            .timeout(SHORT_TIMEOUT)
            .call();

        match result {
            Ok(response) => {
                let body: HealthResponse = response
                    .into_json()
                    .map_err(|e| ServerError::Protocol(format!("health response: {}", e)))?;
                if let Some(provider) = &body.current_provider {
                    tracing::trace!("Current transcription provider: {}", provider);
                }
                self.record_health(
                    body.server_healthy.unwrap_or(true),
                    body.provider_available,
                );
                Ok(self.health_tx.borrow().clone())
            }
            Err(e) => {
                self.record_health(false, false);
                Err(map_ureq_error(e))
            }
        }
    }

    /// POST /api/transcribe with a WAV payload (generous timeout).
    ///
    /// Success flips health to healthy; failure flips it unhealthy, so even
    /// between health polls the transcribe path keeps the status current.
    pub fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        language: Option<&str>,
    ) -> Result<Transcription, ServerError> {
        let wav_data = encode_wav(samples, sample_rate)?;
        tracing::debug!(
            "Sending {:.2}s of audio ({} bytes WAV)",
            samples.len() as f32 / sample_rate as f32,
            wav_data.len()
        );

        let (boundary, body) = build_multipart_body(&wav_data, language);

        let start = std::time::Instant::now();
        let result = ureq::post(&self.url("/api/transcribe"))
            .timeout(TRANSCRIBE_TIMEOUT)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body);

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                self.record_health(false, false);
                return Err(map_ureq_error(e));
            }
        };

        let json: serde_json::Value = response
            .into_json()
            .map_err(|e| ServerError::Protocol(format!("transcribe response: {}", e)))?;
        let transcription = parse_transcription(json)?;

        self.record_health(true, true);
        tracing::info!(
            "Transcription completed in {:.2}s",
            start.elapsed().as_secs_f32()
        );
        Ok(transcription)
    }

    /// POST /api/status {recording, cancelled} — best-effort telemetry,
    /// failures swallowed
    pub fn post_status(&self, recording: bool, cancelled: bool) {
        let result = ureq::post(&self.url("/api/status"))
            .timeout(SHORT_TIMEOUT)
            .send_json(serde_json::json!({
                "recording": recording,
                "cancelled": cancelled,
            }));
        if let Err(e) = result {
            tracing::trace!("Status broadcast failed (ignored): {}", e);
        }
    }

    /// POST /api/log {level, message} — best-effort telemetry,
    /// failures swallowed
    pub fn post_log(&self, level: &str, message: &str) {
        let result = ureq::post(&self.url("/api/log"))
            .timeout(SHORT_TIMEOUT)
            .send_json(serde_json::json!({
                "level": level,
                "message": message,
            }));
        if let Err(e) = result {
            tracing::trace!("Log broadcast failed (ignored): {}", e);
        }
    }
}

fn map_ureq_error(e: ureq::Error) -> ServerError {
    match e {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            ServerError::Status { status, body }
        }
        ureq::Error::Transport(t) => ServerError::Network(t.to_string()),
    }
}

/// Extract a [`Transcription`] from the response JSON.
///
/// A missing `text` field is a protocol error; an empty string is a valid
/// "no speech detected" result and left to the caller.
fn parse_transcription(json: serde_json::Value) -> Result<Transcription, ServerError> {
    if json.get("text").and_then(|v| v.as_str()).is_none() {
        return Err(ServerError::Protocol(format!(
            "response missing 'text' field: {}",
            json
        )));
    }
    let mut transcription: Transcription = serde_json::from_value(json)
        .map_err(|e| ServerError::Protocol(format!("transcribe response: {}", e)))?;
    transcription.text = transcription.text.trim().to_string();
    Ok(transcription)
}

/// Encode f32 samples to 16-bit mono WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, ServerError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut buffer, spec)
        .map_err(|e| ServerError::Encode(format!("Failed to create WAV writer: {}", e)))?;

    // Convert f32 [-1.0, 1.0] to i16
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = (clamped * i16::MAX as f32) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| ServerError::Encode(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| ServerError::Encode(format!("Failed to finalize WAV: {}", e)))?;

    Ok(buffer.into_inner())
}

/// Build the multipart form body for the transcribe request
fn build_multipart_body(wav_data: &[u8], language: Option<&str>) -> (String, Vec<u8>) {
    let boundary = format!(
        "----PushtypeBoundary{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );

    let mut body = Vec::new();

    // File field
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"audio.wav\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
    body.extend_from_slice(wav_data);
    body.extend_from_slice(b"\r\n");

    // Language field (omitted for auto-detect)
    if let Some(language) = language {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"language\"\r\n\r\n");
        body.extend_from_slice(language.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (boundary, body)
}
