//! Error types for pushtype
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the pushtype application
#[derive(Error, Debug)]
pub enum PushtypeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key listener error: {0}")]
    Keys(#[from] KeyError),

    #[error("Audio capture error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transcription server error: {0}")]
    Server(#[from] ServerError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to global key event detection
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Failed to start the global key listener: {0}.\n  On macOS, grant Input Monitoring permission in System Settings > Privacy & Security.")]
    ListenFailed(String),

    #[error("Unknown trigger key: '{0}'. Valid values: ctrl, shift")]
    UnknownKey(String),
}

/// Errors related to audio capture
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio connection failed: {0}")]
    Connection(String),

    #[error("Audio device not found: '{0}'")]
    DeviceNotFound(String),

    #[error("Device open failed after {attempts} attempts: {last}")]
    OpenFailed { attempts: u32, last: String },

    #[error("Audio stream close timed out after {0} seconds")]
    CloseTimeout(u32),

    #[error("No audio was captured. Check your microphone.")]
    EmptyRecording,

    #[error("Audio stream error: {0}")]
    StreamError(String),
}

/// Errors related to the transcription server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed server response: {0}")]
    Protocol(String),

    #[error("Audio encoding failed: {0}")]
    Encode(String),
}

/// Errors related to the deliver-and-restore transaction
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Clipboard read failed: {0}")]
    ClipboardRead(String),

    #[error("Clipboard write failed: {0}")]
    ClipboardWrite(String),

    #[error("Paste simulation failed: {0}.\n  On macOS, grant Automation/Accessibility permission in System Settings.")]
    PasteFailed(String),

    #[error("Application activation failed: {0}")]
    ActivateFailed(String),
}

/// Result type alias using PushtypeError
pub type Result<T> = std::result::Result<T, PushtypeError>;
