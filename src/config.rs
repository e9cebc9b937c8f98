//! Configuration loading and types for pushtype
//!
//! Two layers of configuration exist:
//!
//! 1. A local TOML file (~/.config/pushtype/config.toml) for everything the
//!    transcription server does not own: server URL, audio device, session
//!    duration bounds, poll intervals, indicator command.
//! 2. Server-owned settings fetched by the config sync monitor (keybinding,
//!    language, delivery delays, focus-follow). These are merged with the
//!    local file into an immutable [`ConfigSnapshot`] that is swapped whole,
//!    so readers never observe a partial update.

use crate::error::PushtypeError;
use crate::keys::{KeybindingMode, TriggerKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Pushtype Configuration
#
# Location: ~/.config/pushtype/config.toml
# Settings owned by the transcription server (keybinding, language,
# paste delays, focus-follow) are synced at runtime and not listed here.

[server]
# Base URL of the local transcription server
url = "http://127.0.0.1:8000"

# Settings poll interval in seconds
settings_interval_secs = 2

# Run the (more expensive) health check every Nth settings poll
health_every = 5

[audio]
# Audio input device ("default" uses the system default)
device = "default"

# Sample rate in Hz (the server expects 16000)
sample_rate = 16000

[session]
# Recordings shorter than this are treated as accidental taps and discarded
min_duration_secs = 0.3

# Maximum recording duration in seconds; the watchdog force-stops beyond this
max_duration_secs = 60

[focus]
# Pointer poll interval in milliseconds
poll_interval_ms = 200

# A window must stay under the pointer this long before it becomes the
# delivery target
dwell_ms = 600

# Cooldown after each raise-on-hover activation, in milliseconds
activation_cooldown_ms = 2000

# Surfaces that never become delivery targets
ignored_apps = ["Dock", "Notification Center", "Control Center"]

# External command printing "identifier<TAB>pid" for the window under the
# pointer. Unset = focus tracking reports no candidates.
# observer_command = "pushtype-window-observer"

# [indicator]
# External program run with the session state ("recording", "processing",
# "error", "hidden") as its only argument. Unset = log-only indicator.
# command = "pushtype-indicator"
"#;

/// Root configuration structure (local file)
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub focus: FocusConfig,
    #[serde(default)]
    pub indicator: IndicatorConfig,
}

/// Transcription server connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL, e.g. "http://127.0.0.1:8000"
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Settings poll interval in seconds
    #[serde(default = "default_settings_interval")]
    pub settings_interval_secs: u64,

    /// Health check runs every Nth settings poll
    #[serde(default = "default_health_every")]
    pub health_every: u32,
}

/// Audio capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Input device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate in Hz (the server expects 16000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

/// Session duration bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Recordings shorter than this are discarded as accidental taps
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: f64,

    /// Watchdog force-stop limit in seconds
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
}

/// Focus tracker tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FocusConfig {
    #[serde(default = "default_focus_poll_ms")]
    pub poll_interval_ms: u64,

    /// Dwell time before a window becomes the settled delivery target
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,

    /// Cooldown after each raise-on-hover activation
    #[serde(default = "default_cooldown_ms")]
    pub activation_cooldown_ms: u64,

    /// Surfaces that never become delivery targets
    #[serde(default = "default_ignored_apps")]
    pub ignored_apps: Vec<String>,

    /// External command reporting the window under the pointer
    #[serde(default)]
    pub observer_command: Option<String>,
}

/// Visual indicator configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct IndicatorConfig {
    /// External program invoked with the state name as its only argument
    #[serde(default)]
    pub command: Option<String>,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_settings_interval() -> u64 {
    2
}
fn default_health_every() -> u32 {
    5
}
fn default_device() -> String {
    "default".to_string()
}
fn default_sample_rate() -> u32 {
    16000
}
fn default_min_duration() -> f64 {
    0.3
}
fn default_max_duration() -> u64 {
    60
}
fn default_focus_poll_ms() -> u64 {
    200
}
fn default_dwell_ms() -> u64 {
    600
}
fn default_cooldown_ms() -> u64 {
    2000
}
fn default_ignored_apps() -> Vec<String> {
    vec![
        "Dock".to_string(),
        "Notification Center".to_string(),
        "Control Center".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            settings_interval_secs: default_settings_interval(),
            health_every: default_health_every(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
        }
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_focus_poll_ms(),
            dwell_ms: default_dwell_ms(),
            activation_cooldown_ms: default_cooldown_ms(),
            ignored_apps: default_ignored_apps(),
            observer_command: None,
        }
    }
}

impl Config {
    /// Default config file path (~/.config/pushtype/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("pushtype").join("config.toml"))
    }
}

/// Load configuration: built-in defaults, then the config file if present
pub fn load_config(path: Option<&Path>) -> Result<Config, PushtypeError> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => Config::default_path(),
    };

    match path {
        Some(ref p) if p.exists() => {
            let contents = std::fs::read_to_string(p)?;
            let config: Config = toml::from_str(&contents)
                .map_err(|e| PushtypeError::Config(format!("Failed to parse {:?}: {}", p, e)))?;
            tracing::debug!("Loaded config from {:?}", p);
            Ok(config)
        }
        _ => {
            tracing::debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Settings owned by the transcription server (GET /api/settings)
///
/// Mirrors the server's settings schema; unknown fields are ignored so the
/// client keeps working when the server grows new settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// Primary trigger modifier: "ctrl" or "shift" (+ left Option)
    #[serde(default = "default_keybinding")]
    pub keybinding: String,

    /// Transcription language; empty = auto-detect
    #[serde(default)]
    pub language: String,

    /// Delay after paste before restoring the clipboard, in seconds
    #[serde(default = "default_paste_delay")]
    pub paste_delay: f64,

    /// Delay after the clipboard write before pasting, in seconds
    #[serde(default = "default_clipboard_sync_delay")]
    pub clipboard_sync_delay: f64,

    /// Whether the focus tracker runs at all
    #[serde(default)]
    pub focus_follow: bool,

    /// "track" (activate at paste time) or "raise" (activate on dwell)
    #[serde(default = "default_focus_mode")]
    pub focus_follow_mode: String,
}

fn default_keybinding() -> String {
    "ctrl".to_string()
}
fn default_paste_delay() -> f64 {
    0.5
}
fn default_clipboard_sync_delay() -> f64 {
    0.15
}
fn default_focus_mode() -> String {
    "track".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            keybinding: default_keybinding(),
            language: String::new(),
            paste_delay: default_paste_delay(),
            clipboard_sync_delay: default_clipboard_sync_delay(),
            focus_follow: false,
            focus_follow_mode: default_focus_mode(),
        }
    }
}

/// Focus-follow behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusFollowMode {
    /// Track the candidate silently; activate it only at paste time
    Track,
    /// Activate the candidate as soon as it settles under the pointer
    Raise,
}

/// Immutable merged view of local config and server settings
///
/// Replaced wholesale by the config sync monitor through a watch channel;
/// every reader sees a consistent snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub keybinding: KeybindingMode,
    pub language: Option<String>,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub clipboard_sync_delay: Duration,
    pub paste_delay: Duration,
    pub focus_follow_enabled: bool,
    pub focus_follow_mode: FocusFollowMode,
}

impl ConfigSnapshot {
    /// Merge local config with server settings.
    ///
    /// An unknown keybinding or focus mode from the server falls back to the
    /// defaults rather than failing the sync cycle.
    pub fn merge(config: &Config, settings: &ServerSettings) -> Self {
        let keybinding = KeybindingMode::from_server_keybinding(&settings.keybinding)
            .unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid server keybinding: {}", e);
                KeybindingMode::ModifierPlusSecondary {
                    primary: TriggerKey::LeftCtrl,
                    secondary: TriggerKey::LeftAlt,
                }
            });

        let focus_follow_mode = match settings.focus_follow_mode.as_str() {
            "raise" => FocusFollowMode::Raise,
            "track" => FocusFollowMode::Track,
            other => {
                tracing::warn!("Unknown focus_follow_mode {:?}, using track", other);
                FocusFollowMode::Track
            }
        };

        Self {
            keybinding,
            language: if settings.language.is_empty() {
                None
            } else {
                Some(settings.language.clone())
            },
            min_duration: checked_secs(
                config.session.min_duration_secs,
                default_min_duration(),
                "min_duration_secs",
            ),
            max_duration: Duration::from_secs(config.session.max_duration_secs),
            clipboard_sync_delay: checked_secs(
                settings.clipboard_sync_delay,
                default_clipboard_sync_delay(),
                "clipboard_sync_delay",
            ),
            paste_delay: checked_secs(
                settings.paste_delay,
                default_paste_delay(),
                "paste_delay",
            ),
            focus_follow_enabled: settings.focus_follow,
            focus_follow_mode,
        }
    }

    /// Snapshot built purely from local defaults, used until the first
    /// successful settings sync
    pub fn initial(config: &Config) -> Self {
        Self::merge(config, &ServerSettings::default())
    }
}

/// Duration from an untrusted float. `Duration::from_secs_f64` panics on
/// negative or non-finite input, and these values come straight off the
/// wire (or the config file), so a bad one falls back to the default with
/// a warning instead of killing the sync loop.
fn checked_secs(value: f64, default: f64, name: &str) -> Duration {
    if value.is_finite() && value >= 0.0 {
        Duration::from_secs_f64(value)
    } else {
        tracing::warn!("Ignoring invalid {} {:?}, using {}s", name, value, default);
        Duration::from_secs_f64(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::TriggerKey;

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.server.url, "http://127.0.0.1:8000");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.session.max_duration_secs, 60);
        assert!(config.indicator.command.is_none());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.settings_interval_secs, 2);
        assert_eq!(config.server.health_every, 5);
        assert!((config.session.min_duration_secs - 0.3).abs() < f64::EPSILON);
        assert!(config.focus.ignored_apps.contains(&"Dock".to_string()));
    }

    #[test]
    fn test_partial_config_overrides() {
        let config: Config = toml::from_str(
            r#"
            [server]
            url = "http://10.0.0.2:9000"

            [session]
            max_duration_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.server.url, "http://10.0.0.2:9000");
        assert_eq!(config.session.max_duration_secs, 120);
        // Untouched sections keep defaults
        assert_eq!(config.audio.device, "default");
    }

    #[test]
    fn test_server_settings_ignore_unknown_fields() {
        let settings: ServerSettings = serde_json::from_str(
            r#"{"keybinding": "shift", "language": "fr", "paste_delay": 0.2,
                "clipboard_sync_delay": 0.1, "focus_follow": true,
                "focus_follow_mode": "raise", "brand_new_setting": 42}"#,
        )
        .unwrap();
        assert_eq!(settings.keybinding, "shift");
        assert!(settings.focus_follow);
    }

    #[test]
    fn test_snapshot_merge() {
        let config = Config::default();
        let settings = ServerSettings {
            keybinding: "shift".to_string(),
            language: "en".to_string(),
            paste_delay: 1.0,
            clipboard_sync_delay: 0.25,
            focus_follow: true,
            focus_follow_mode: "raise".to_string(),
        };

        let snapshot = ConfigSnapshot::merge(&config, &settings);
        assert_eq!(snapshot.keybinding.primary(), TriggerKey::LeftShift);
        assert_eq!(snapshot.language.as_deref(), Some("en"));
        assert_eq!(snapshot.paste_delay, Duration::from_secs_f64(1.0));
        assert_eq!(snapshot.clipboard_sync_delay, Duration::from_secs_f64(0.25));
        assert_eq!(snapshot.focus_follow_mode, FocusFollowMode::Raise);
        assert_eq!(snapshot.max_duration, Duration::from_secs(60));
    }

    #[test]
    fn test_snapshot_merge_invalid_values_fall_back() {
        let config = Config::default();
        let settings = ServerSettings {
            keybinding: "hyper".to_string(),
            focus_follow_mode: "teleport".to_string(),
            ..ServerSettings::default()
        };

        let snapshot = ConfigSnapshot::merge(&config, &settings);
        assert_eq!(snapshot.keybinding.primary(), TriggerKey::LeftCtrl);
        assert_eq!(snapshot.focus_follow_mode, FocusFollowMode::Track);
    }

    #[test]
    fn test_snapshot_merge_out_of_range_delays_fall_back() {
        let config = Config::default();
        let settings = ServerSettings {
            paste_delay: -1.0,
            clipboard_sync_delay: f64::NAN,
            ..ServerSettings::default()
        };

        // Must not panic in the Duration conversion; both fall back
        let snapshot = ConfigSnapshot::merge(&config, &settings);
        assert_eq!(snapshot.paste_delay, Duration::from_millis(500));
        assert_eq!(snapshot.clipboard_sync_delay, Duration::from_millis(150));
    }

    #[test]
    fn test_snapshot_merge_non_finite_min_duration_falls_back() {
        let mut config = Config::default();
        config.session.min_duration_secs = f64::INFINITY;

        let snapshot = ConfigSnapshot::merge(&config, &ServerSettings::default());
        assert_eq!(snapshot.min_duration, Duration::from_millis(300));
    }

    #[test]
    fn test_initial_snapshot_language_auto() {
        let snapshot = ConfigSnapshot::initial(&Config::default());
        assert_eq!(snapshot.language, None);
        assert!(!snapshot.focus_follow_enabled);
        assert_eq!(snapshot.min_duration, Duration::from_millis(300));
    }
}
