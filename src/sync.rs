//! Config sync monitor
//!
//! A background loop that polls the transcription server for settings,
//! merges them with the local config, and swaps the resulting snapshot
//! whole through a watch channel. Change notices are logged only when a
//! value actually differs. Every Nth poll additionally runs the health
//! check, which is more expensive and less urgent than settings sync.

use crate::config::{Config, ConfigSnapshot};
use crate::server::ServerClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Background settings/health polling loop
pub struct ConfigSyncMonitor {
    server: Arc<ServerClient>,
    local: Config,
    config_tx: watch::Sender<ConfigSnapshot>,
}

impl ConfigSyncMonitor {
    pub fn new(
        server: Arc<ServerClient>,
        local: Config,
    ) -> (Self, watch::Receiver<ConfigSnapshot>) {
        let initial = ConfigSnapshot::initial(&local);
        let (config_tx, config_rx) = watch::channel(initial);
        (
            Self {
                server,
                local,
                config_tx,
            },
            config_rx,
        )
    }

    /// Run until the shutdown signal flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let poll = Duration::from_secs(self.local.server.settings_interval_secs.max(1));
        let health_every = self.local.server.health_every.max(1);

        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut tick: u32 = 0;

        tracing::debug!(
            "Config sync started (every {:?}, health every {} polls)",
            poll,
            health_every
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            tick = tick.wrapping_add(1);

            let server = self.server.clone();
            match tokio::task::spawn_blocking(move || server.fetch_settings()).await {
                Ok(Ok(settings)) => {
                    let snapshot = ConfigSnapshot::merge(&self.local, &settings);
                    apply_snapshot(&self.config_tx, snapshot);
                }
                Ok(Err(e)) => {
                    // The health sub-cycle owns edge logging for outages
                    tracing::debug!("Settings sync failed: {}", e);
                }
                Err(e) => tracing::warn!("Settings sync task failed: {}", e),
            }

            if tick % health_every == 0 {
                let server = self.server.clone();
                match tokio::task::spawn_blocking(move || server.check_health()).await {
                    Ok(Ok(_)) | Ok(Err(_)) => {} // record_health logged any edge
                    Err(e) => tracing::warn!("Health check task failed: {}", e),
                }
            }
        }

        tracing::debug!("Config sync stopped");
    }
}

/// Swap in a new snapshot, logging human-readable notices for each field
/// that actually changed. Returns whether anything changed.
fn apply_snapshot(tx: &watch::Sender<ConfigSnapshot>, new: ConfigSnapshot) -> bool {
    tx.send_if_modified(|current| {
        if *current == new {
            return false;
        }

        if current.keybinding != new.keybinding {
            tracing::info!("Keybinding changed to {}", new.keybinding);
        }
        if current.language != new.language {
            tracing::info!(
                "Language changed to {}",
                new.language.as_deref().unwrap_or("auto")
            );
        }
        if current.focus_follow_enabled != new.focus_follow_enabled {
            if new.focus_follow_enabled {
                tracing::info!("Focus follow enabled ({:?} mode)", new.focus_follow_mode);
            } else {
                tracing::info!("Focus follow disabled");
            }
        } else if current.focus_follow_mode != new.focus_follow_mode {
            tracing::info!("Focus follow mode changed to {:?}", new.focus_follow_mode);
        }
        if current.paste_delay != new.paste_delay
            || current.clipboard_sync_delay != new.clipboard_sync_delay
        {
            tracing::info!(
                "Delivery delays changed (sync {:?}, paste {:?})",
                new.clipboard_sync_delay,
                new.paste_delay
            );
        }

        *current = new;
        true
    })
}
