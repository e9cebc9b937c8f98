//! Daemon orchestration
//!
//! Builds every component explicitly and owns the single event loop.
//! All cross-component state travels through watch channels (config
//! snapshots, health, the settled focus candidate, shutdown), so there
//! is no global and no lock shared across tasks.

use crate::audio::CpalPort;
use crate::config::Config;
use crate::delivery::Delivery;
use crate::error::{PushtypeError, Result};
use crate::focus::FocusTracker;
use crate::indicator::create_indicator;
use crate::keys::{TriggerClassifier, TriggerSignal};
use crate::listener::spawn_listener;
use crate::platform::{
    CommandActivator, CommandClipboard, CommandObserver, CommandPaster, NullObserver,
    WindowObserver,
};
use crate::server::ServerClient;
use crate::session::{SessionCoordinator, SessionEvent};
use crate::sync::ConfigSyncMonitor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};

/// Run the daemon until SIGINT/SIGTERM
pub async fn run(config: Config) -> Result<()> {
    tracing::info!("Starting pushtype daemon");
    tracing::info!("Transcription server: {}", config.server.url);

    let server = Arc::new(ServerClient::new(&config.server.url));

    // One reachability probe up front so a dead server is visible in the
    // startup log; the sync monitor keeps retrying either way. The probe
    // records its outcome in the health watch, which is read back here.
    {
        let probe = server.clone();
        match tokio::task::spawn_blocking(move || probe.check_health()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!("Startup health probe: {}", e),
            Err(e) => tracing::warn!("Health probe task failed: {}", e),
        }
        let status = server.health().borrow().clone();
        if status.server_healthy && status.provider_available {
            tracing::info!("Transcription server is ready");
        } else if status.server_healthy {
            tracing::warn!("Server reachable, but no transcription provider loaded");
        } else {
            tracing::warn!("Transcription server not reachable yet");
        }
    }

    let (monitor, config_rx) = ConfigSyncMonitor::new(server.clone(), config.clone());

    // Raise-on-hover pauses while the secondary trigger key is held
    let paused = Arc::new(AtomicBool::new(false));
    let observer: Arc<dyn WindowObserver> = match &config.focus.observer_command {
        Some(command) => Arc::new(CommandObserver::new(command.clone())),
        None => Arc::new(NullObserver),
    };
    let activator = Arc::new(CommandActivator);
    let (tracker, focus_rx) = FocusTracker::new(
        observer,
        activator.clone(),
        config_rx.clone(),
        config.focus.clone(),
        paused.clone(),
    );

    let delivery = Arc::new(Delivery::new(
        Arc::new(CommandClipboard),
        Arc::new(CommandPaster),
        activator,
    ));

    let indicator = create_indicator(&config.indicator);
    let port = Arc::new(CpalPort::new(&config.audio));

    let (events_tx, mut events_rx) = mpsc::channel(16);
    let session = SessionCoordinator::new(
        port,
        server.clone(),
        server.clone(),
        delivery,
        indicator,
        config_rx.clone(),
        focus_rx,
        events_tx,
        config.audio.sample_rate,
    );

    let mut key_rx = spawn_listener()?;
    let mut classifier = TriggerClassifier::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_task = tokio::spawn(monitor.run(shutdown_rx.clone()));
    let focus_task = tokio::spawn(tracker.run(shutdown_rx));

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| PushtypeError::Config(format!("Failed to set up SIGTERM handler: {}", e)))?;

    tracing::info!("Push-to-talk: {}", config_rx.borrow().keybinding);

    loop {
        tokio::select! {
            Some(event) = key_rx.recv() => {
                // The keybinding can change between events; read it fresh
                let mode = config_rx.borrow().keybinding;
                let trigger = classifier.classify(event, &mode);
                paused.store(classifier.secondary_held(), Ordering::Relaxed);
                match trigger {
                    Some(TriggerSignal::Satisfied) => session.on_trigger_satisfied().await,
                    Some(TriggerSignal::Released) => session.on_trigger_released().await,
                    Some(TriggerSignal::ForeignKey) => session.on_foreign_key(),
                    None => {}
                }
                if classifier.all_released() {
                    session.on_all_keys_released();
                }
            }

            Some(SessionEvent::WatchdogFired { session_id }) = events_rx.recv() => {
                // Only a forced stop may clear the trigger flags; a stale
                // event must not wipe the state of a newer gesture
                if session.on_watchdog(session_id).await {
                    classifier.reset();
                    paused.store(false, Ordering::Relaxed);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down...");
                break;
            }

            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down...");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let join = async {
        let _ = sync_task.await;
        let _ = focus_task.await;
    };
    // A poll stuck in a slow settings fetch should not hold up shutdown
    if tokio::time::timeout(std::time::Duration::from_secs(5), join)
        .await
        .is_err()
    {
        tracing::warn!("Background loops did not stop in time, exiting anyway");
    }

    tracing::info!("Daemon stopped");
    Ok(())
}
