//! Pushtype: push-to-talk dictation client
//!
//! This library provides the core functionality for:
//! - Classifying global key events into push-to-talk trigger signals (rdev)
//! - Capturing microphone audio via cpal with bounded open/close times
//! - Shipping recordings to a local transcription server (ureq)
//! - Delivering text through a clipboard save/set/paste/restore transaction
//! - Tracking the window under the pointer as the delivery target
//! - Syncing server-owned settings into an immutable config snapshot
//!
//! # Architecture
//!
//! ```text
//!   key listener (rdev thread)          watchdog task
//!          │ raw key events                  │ forced-stop events
//!          ▼                                 ▼
//!   ┌──────────────────────────────────────────────┐
//!   │            Daemon event loop                 │
//!   │   TriggerClassifier ──▶ SessionCoordinator   │
//!   └──────────────────────────────────────────────┘
//!        Idle ─▶ Recording ─▶ Processing ─▶ Idle
//!                    │ (foreign key)
//!                    ▼
//!                Cancelled ─(all keys up)─▶ Idle
//!
//!   Recording:  cpal stream on a dedicated thread
//!   Processing: WAV encode ─▶ POST /api/transcribe ─▶ Delivery
//!   Delivery:   save clipboard ─▶ set text ─▶ paste ─▶ restore
//!
//!   Background: ConfigSyncMonitor (settings + health polling)
//!               FocusTracker (pointer dwell ─▶ delivery target)
//! ```

pub mod audio;
pub mod config;
pub mod daemon;
pub mod delivery;
pub mod error;
pub mod focus;
pub mod indicator;
pub mod keys;
pub mod listener;
pub mod platform;
pub mod server;
pub mod session;
pub mod sync;

pub use config::Config;
pub use error::{PushtypeError, Result};
pub use session::SessionState;
