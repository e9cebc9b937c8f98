//! Recording indicator abstraction
//!
//! The indicator is a fire-and-forget visual side effect; it is told what
//! state to show and never read back. The concrete mechanism (overlay
//! process, notification daemon) stays outside the core, so the daemon
//! only depends on this trait.

use crate::config::IndicatorConfig;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Visual states the indicator can show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Recording,
    Processing,
    Error,
    Hidden,
}

impl IndicatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorState::Recording => "recording",
            IndicatorState::Processing => "processing",
            IndicatorState::Error => "error",
            IndicatorState::Hidden => "hidden",
        }
    }
}

/// Fire-and-forget indicator interface
pub trait Indicator: Send + Sync {
    fn show(&self, state: IndicatorState);
}

/// Indicator that spawns an external command with the state name.
///
/// The spawn is detached and unwaited so indicator latency can never delay
/// a state transition.
pub struct CommandIndicator {
    command: String,
}

impl CommandIndicator {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

impl Indicator for CommandIndicator {
    fn show(&self, state: IndicatorState) {
        tracing::debug!("Indicator: {}", state.as_str());
        let command = self.command.clone();
        tokio::spawn(async move {
            let status = Command::new(&command)
                .arg(state.as_str())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = status {
                tracing::warn!("Indicator command {:?} failed: {}", command, e);
            }
        });
    }
}

/// Log-only indicator used when no command is configured
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn show(&self, state: IndicatorState) {
        tracing::debug!("Indicator: {}", state.as_str());
    }
}

/// Build the indicator from configuration
pub fn create_indicator(config: &IndicatorConfig) -> Arc<dyn Indicator> {
    match &config.command {
        Some(command) => {
            tracing::info!("Indicator command: {}", command);
            Arc::new(CommandIndicator::new(command.clone()))
        }
        None => Arc::new(LogIndicator),
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records every state shown, for asserting indicator ordering in tests
    #[derive(Default)]
    pub struct MockIndicator {
        pub shown: Mutex<Vec<IndicatorState>>,
    }

    impl Indicator for MockIndicator {
        fn show(&self, state: IndicatorState) {
            self.shown.lock().unwrap().push(state);
        }
    }

    impl MockIndicator {
        pub fn states(&self) -> Vec<IndicatorState> {
            self.shown.lock().unwrap().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(IndicatorState::Recording.as_str(), "recording");
        assert_eq!(IndicatorState::Hidden.as_str(), "hidden");
    }

    #[test]
    fn test_create_indicator_defaults_to_log() {
        let indicator = create_indicator(&IndicatorConfig::default());
        // Log indicator accepts every state without side effects
        indicator.show(IndicatorState::Recording);
        indicator.show(IndicatorState::Hidden);
    }
}
