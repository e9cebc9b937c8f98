//! Platform automation capabilities
//!
//! The core depends only on these traits: clipboard read/write, paste
//! simulation, application activation, and window-under-pointer
//! enumeration. Concrete implementations shell out to platform tools
//! (pbcopy/pbpaste and osascript on macOS, wl-copy/wl-paste and ydotool
//! elsewhere); tests substitute deterministic mocks.

use crate::error::DeliveryError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// An application that can receive a paste
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTarget {
    /// Human-readable application identifier (process/app name)
    pub identifier: String,
    /// Process id when known; enables process-targeted paste
    pub pid: Option<i32>,
}

/// Clipboard read/write primitive
#[async_trait::async_trait]
pub trait Clipboard: Send + Sync {
    /// Current clipboard text; None when empty or non-text
    async fn read(&self) -> Result<Option<String>, DeliveryError>;
    async fn write(&self, text: &str) -> Result<(), DeliveryError>;
}

/// Simulated paste keystroke, optionally scoped to one process
#[async_trait::async_trait]
pub trait PasteInjector: Send + Sync {
    async fn paste(&self, target: Option<&AppTarget>) -> Result<(), DeliveryError>;
}

/// Bring an application to the foreground
#[async_trait::async_trait]
pub trait AppActivator: Send + Sync {
    async fn activate(&self, target: &AppTarget) -> Result<(), DeliveryError>;
}

/// Window/pointer enumeration primitive, polled by the focus tracker.
/// Cheap and non-blocking from the tracker's perspective.
#[async_trait::async_trait]
pub trait WindowObserver: Send + Sync {
    async fn app_under_pointer(&self) -> Option<AppTarget>;
}

async fn run_with_stdin(program: &str, args: &[&str], input: &str) -> Result<(), DeliveryError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DeliveryError::ClipboardWrite(format!("{}: {}", program, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(|e| DeliveryError::ClipboardWrite(e.to_string()))?;
        drop(stdin);
    }

    let status = child
        .wait()
        .await
        .map_err(|e| DeliveryError::ClipboardWrite(e.to_string()))?;
    if !status.success() {
        return Err(DeliveryError::ClipboardWrite(format!(
            "{} exited with {}",
            program, status
        )));
    }
    Ok(())
}

async fn run_capture_stdout(program: &str, args: &[&str]) -> Result<String, DeliveryError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| DeliveryError::ClipboardRead(format!("{}: {}", program, e)))?;
    if !output.status.success() {
        return Err(DeliveryError::ClipboardRead(format!(
            "{} exited with {}",
            program, output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Clipboard backed by platform copy/paste commands
pub struct CommandClipboard;

#[cfg(target_os = "macos")]
const COPY_CMD: (&str, &[&str]) = ("pbcopy", &[]);
#[cfg(target_os = "macos")]
const PASTE_CMD: (&str, &[&str]) = ("pbpaste", &[]);

#[cfg(not(target_os = "macos"))]
const COPY_CMD: (&str, &[&str]) = ("wl-copy", &[]);
#[cfg(not(target_os = "macos"))]
const PASTE_CMD: (&str, &[&str]) = ("wl-paste", &["--no-newline"]);

#[async_trait::async_trait]
impl Clipboard for CommandClipboard {
    async fn read(&self) -> Result<Option<String>, DeliveryError> {
        // An empty clipboard makes some tools exit non-zero; treat any
        // failure to read as "nothing to restore" rather than aborting
        match run_capture_stdout(PASTE_CMD.0, PASTE_CMD.1).await {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::debug!("Clipboard read failed, treating as empty: {}", e);
                Ok(None)
            }
        }
    }

    async fn write(&self, text: &str) -> Result<(), DeliveryError> {
        run_with_stdin(COPY_CMD.0, COPY_CMD.1, text).await
    }
}

/// Paste keystroke via osascript (macOS) or ydotool (elsewhere)
pub struct CommandPaster;

#[async_trait::async_trait]
impl PasteInjector for CommandPaster {
    #[cfg(target_os = "macos")]
    async fn paste(&self, target: Option<&AppTarget>) -> Result<(), DeliveryError> {
        // Scope the keystroke to the target process when one is known;
        // otherwise System Events sends it to the frontmost application
        let script = match target {
            Some(app) => format!(
                "tell application \"System Events\" to tell process \"{}\" to keystroke \"v\" using command down",
                app.identifier.replace('"', "\\\"")
            ),
            None => "tell application \"System Events\" to keystroke \"v\" using command down"
                .to_string(),
        };

        let output = Command::new("osascript")
            .args(["-e", &script])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DeliveryError::PasteFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeliveryError::PasteFailed(stderr.trim().to_string()));
        }
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    async fn paste(&self, _target: Option<&AppTarget>) -> Result<(), DeliveryError> {
        // 29 = KEY_LEFTCTRL, 47 = KEY_V; code:1 press, code:0 release
        let output = Command::new("ydotool")
            .args(["key", "29:1", "47:1", "47:0", "29:0"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DeliveryError::PasteFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeliveryError::PasteFailed(stderr.trim().to_string()));
        }
        Ok(())
    }
}

/// Application activation via osascript; a no-op error elsewhere
pub struct CommandActivator;

#[async_trait::async_trait]
impl AppActivator for CommandActivator {
    #[cfg(target_os = "macos")]
    async fn activate(&self, target: &AppTarget) -> Result<(), DeliveryError> {
        let script = format!(
            "tell application \"{}\" to activate",
            target.identifier.replace('"', "\\\"")
        );
        let output = Command::new("osascript")
            .args(["-e", &script])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DeliveryError::ActivateFailed(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeliveryError::ActivateFailed(stderr.trim().to_string()));
        }
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    async fn activate(&self, target: &AppTarget) -> Result<(), DeliveryError> {
        Err(DeliveryError::ActivateFailed(format!(
            "no activation backend for {}",
            target.identifier
        )))
    }
}

/// Observer backed by an external command printing "identifier<TAB>pid"
/// for the window under the pointer; empty output = no candidate
pub struct CommandObserver {
    command: String,
}

impl CommandObserver {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait::async_trait]
impl WindowObserver for CommandObserver {
    async fn app_under_pointer(&self) -> Option<AppTarget> {
        let output = Command::new(&self.command)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_observer_line(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Observer that never reports a candidate (focus-follow effectively off)
pub struct NullObserver;

#[async_trait::async_trait]
impl WindowObserver for NullObserver {
    async fn app_under_pointer(&self) -> Option<AppTarget> {
        None
    }
}

fn parse_observer_line(line: &str) -> Option<AppTarget> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut parts = line.splitn(2, '\t');
    let identifier = parts.next()?.trim().to_string();
    if identifier.is_empty() {
        return None;
    }
    let pid = parts.next().and_then(|p| p.trim().parse().ok());
    Some(AppTarget { identifier, pid })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_observer_line_with_pid() {
        let target = parse_observer_line("Safari\t4242\n").unwrap();
        assert_eq!(target.identifier, "Safari");
        assert_eq!(target.pid, Some(4242));
    }

    #[test]
    fn test_parse_observer_line_without_pid() {
        let target = parse_observer_line("Terminal\n").unwrap();
        assert_eq!(target.identifier, "Terminal");
        assert_eq!(target.pid, None);
    }

    #[test]
    fn test_parse_observer_line_empty() {
        assert!(parse_observer_line("").is_none());
        assert!(parse_observer_line("  \n").is_none());
        assert!(parse_observer_line("\t123").is_none());
    }
}
