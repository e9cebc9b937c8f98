//! Focus tracker
//!
//! A background loop polling which application lies under the pointer.
//! A candidate must stay put for a dwell period before it becomes the
//! settled delivery target, so pointer flicker never counts as a focus
//! change. In raise-on-hover mode the settled candidate is activated
//! immediately (with a cooldown); in track-only mode activation is left
//! to the delivery transaction at paste time.

use crate::config::{ConfigSnapshot, FocusConfig, FocusFollowMode};
use crate::platform::{AppActivator, AppTarget, WindowObserver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// The settled application under the pointer
#[derive(Debug, Clone, PartialEq)]
pub struct FocusCandidate {
    pub app: AppTarget,
    pub dwell_started_at: Instant,
}

/// Background pointer-focus tracking loop
pub struct FocusTracker {
    observer: Arc<dyn WindowObserver>,
    activator: Arc<dyn AppActivator>,
    config: watch::Receiver<ConfigSnapshot>,
    tuning: FocusConfig,
    settled_tx: watch::Sender<Option<FocusCandidate>>,
    /// Set while the secondary trigger key is held; raise-on-hover must not
    /// fight an in-progress recording gesture
    paused: Arc<AtomicBool>,
}

impl FocusTracker {
    pub fn new(
        observer: Arc<dyn WindowObserver>,
        activator: Arc<dyn AppActivator>,
        config: watch::Receiver<ConfigSnapshot>,
        tuning: FocusConfig,
        paused: Arc<AtomicBool>,
    ) -> (Self, watch::Receiver<Option<FocusCandidate>>) {
        let (settled_tx, settled_rx) = watch::channel(None);
        (
            Self {
                observer,
                activator,
                config,
                tuning,
                settled_tx,
                paused,
            },
            settled_rx,
        )
    }

    /// Run until the shutdown signal flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let poll = Duration::from_millis(self.tuning.poll_interval_ms);
        let dwell = Duration::from_millis(self.tuning.dwell_ms);
        let cooldown = Duration::from_millis(self.tuning.activation_cooldown_ms);

        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut pending: Option<(AppTarget, Instant)> = None;
        let mut last_activation: Option<Instant> = None;
        // Settled candidate whose raise was deferred by the cooldown
        let mut pending_raise: Option<AppTarget> = None;

        tracing::debug!(
            "Focus tracker started (poll {:?}, dwell {:?})",
            poll,
            dwell
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            let snapshot = self.config.borrow().clone();
            if !snapshot.focus_follow_enabled {
                pending = None;
                if self.settled_tx.borrow().is_some() {
                    let _ = self.settled_tx.send(None);
                }
                continue;
            }

            let raise_mode = snapshot.focus_follow_mode == FocusFollowMode::Raise;
            if raise_mode && self.paused.load(Ordering::SeqCst) {
                // A recording gesture is in progress
                pending = None;
                continue;
            }

            let observed = self.observer.app_under_pointer().await;
            let Some(target) = observed.filter(|t| !self.is_ignored(t)) else {
                // Pointer over nothing trackable; the settled candidate stays
                pending = None;
                continue;
            };

            match &pending {
                Some((candidate, since)) if *candidate == target => {
                    let since = *since;
                    if since.elapsed() >= dwell {
                        if !self.is_settled(&target) {
                            tracing::debug!("Focus settled on {}", target.identifier);
                            let _ = self.settled_tx.send(Some(FocusCandidate {
                                app: target.clone(),
                                dwell_started_at: since,
                            }));
                            if raise_mode {
                                pending_raise = Some(target.clone());
                            }
                        }

                        // A raise deferred by the cooldown at settle time is
                        // retried on later ticks while the pointer stays here
                        if raise_mode
                            && pending_raise.as_ref() == Some(&target)
                            && last_activation.map_or(true, |t| t.elapsed() >= cooldown)
                        {
                            if let Err(e) = self.activator.activate(&target).await {
                                tracing::warn!("Raise-on-hover failed: {}", e);
                            } else {
                                last_activation = Some(Instant::now());
                            }
                            pending_raise = None;
                        }
                    }
                }
                _ => {
                    pending = Some((target, Instant::now()));
                    pending_raise = None;
                }
            }
        }

        tracing::debug!("Focus tracker stopped");
    }

    fn is_ignored(&self, target: &AppTarget) -> bool {
        self.tuning
            .ignored_apps
            .iter()
            .any(|ignored| ignored == &target.identifier)
    }

    fn is_settled(&self, target: &AppTarget) -> bool {
        self.settled_tx
            .borrow()
            .as_ref()
            .map(|c| &c.app == target)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ServerSettings};
    use crate::platform::mock::{MockActivator, MockObserver};

    fn snapshot(focus_follow: bool, mode: &str) -> ConfigSnapshot {
        let settings = ServerSettings {
            focus_follow,
            focus_follow_mode: mode.to_string(),
            ..ServerSettings::default()
        };
        ConfigSnapshot::merge(&Config::default(), &settings)
    }

    fn fast_tuning() -> FocusConfig {
        FocusConfig {
            poll_interval_ms: 10,
            dwell_ms: 35,
            activation_cooldown_ms: 100,
            ignored_apps: vec!["Dock".to_string()],
            observer_command: None,
        }
    }

    fn app(name: &str) -> AppTarget {
        AppTarget {
            identifier: name.to_string(),
            pid: Some(1),
        }
    }

    struct Fixture {
        settled: watch::Receiver<Option<FocusCandidate>>,
        activator: Arc<MockActivator>,
        shutdown_tx: watch::Sender<bool>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(observations: Vec<Option<AppTarget>>, cfg: ConfigSnapshot) -> Fixture {
        let observer = Arc::new(MockObserver::new(observations));
        let activator = Arc::new(MockActivator::default());
        let (_cfg_tx, cfg_rx) = {
            let (tx, rx) = watch::channel(cfg);
            // Keep the sender alive for the duration of the test
            (Box::leak(Box::new(tx)), rx)
        };
        let paused = Arc::new(AtomicBool::new(false));
        let (tracker, settled) = FocusTracker::new(
            observer,
            activator.clone(),
            cfg_rx,
            fast_tuning(),
            paused,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(tracker.run(shutdown_rx));
        Fixture {
            settled,
            activator,
            shutdown_tx,
            task,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_candidate_settles_after_dwell() {
        let fx = start(vec![Some(app("Safari"))], snapshot(true, "track"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(fx.settled.borrow().is_none(), "settled before dwell elapsed");

        tokio::time::sleep(Duration::from_millis(60)).await;
        let settled = fx.settled.borrow().clone();
        assert_eq!(settled.unwrap().app.identifier, "Safari");

        // Track-only mode never activates proactively
        assert!(fx.activator.activated.lock().unwrap().is_empty());

        let _ = fx.shutdown_tx.send(true);
        let _ = fx.task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flicker_does_not_settle() {
        // Pointer alternates between two windows faster than the dwell
        let mut observations = Vec::new();
        for _ in 0..10 {
            observations.push(Some(app("Safari")));
            observations.push(Some(app("Terminal")));
        }
        let fx = start(observations, snapshot(true, "track"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(fx.settled.borrow().is_none());

        let _ = fx.shutdown_tx.send(true);
        let _ = fx.task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_surfaces_never_settle() {
        let fx = start(vec![Some(app("Dock"))], snapshot(true, "track"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(fx.settled.borrow().is_none());

        let _ = fx.shutdown_tx.send(true);
        let _ = fx.task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_raise_mode_activates_on_settle() {
        let fx = start(vec![Some(app("Safari"))], snapshot(true, "raise"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let activated = fx.activator.activated.lock().unwrap().clone();
        assert_eq!(activated.len(), 1);
        assert_eq!(activated[0].identifier, "Safari");

        let _ = fx.shutdown_tx.send(true);
        let _ = fx.task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_raise_deferred_by_cooldown_retries_on_dwell() {
        // Safari activates and starts the cooldown; Terminal settles while
        // the cooldown is still running, so its raise happens later, once
        // the cooldown lapses with the pointer still on it
        let mut observations = vec![Some(app("Safari")); 6];
        observations.push(Some(app("Terminal")));
        let fx = start(observations, snapshot(true, "raise"));

        tokio::time::sleep(Duration::from_millis(110)).await;
        {
            let activated = fx.activator.activated.lock().unwrap().clone();
            assert_eq!(activated.len(), 1, "second raise should wait out the cooldown");
            assert_eq!(activated[0].identifier, "Safari");
        }
        assert_eq!(
            fx.settled.borrow().as_ref().unwrap().app.identifier,
            "Terminal"
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        let activated = fx.activator.activated.lock().unwrap().clone();
        assert_eq!(activated.len(), 2);
        assert_eq!(activated[1].identifier, "Terminal");

        let _ = fx.shutdown_tx.send(true);
        let _ = fx.task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_clears_settled_candidate() {
        let observer = Arc::new(MockObserver::new(vec![Some(app("Safari"))]));
        let activator = Arc::new(MockActivator::default());
        let (cfg_tx, cfg_rx) = watch::channel(snapshot(true, "track"));
        let paused = Arc::new(AtomicBool::new(false));
        let (tracker, settled) = FocusTracker::new(
            observer,
            activator,
            cfg_rx,
            fast_tuning(),
            paused,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(tracker.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(settled.borrow().is_some());

        let _ = cfg_tx.send(snapshot(false, "track"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(settled.borrow().is_none());

        let _ = shutdown_tx.send(true);
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_raise_paused_while_secondary_held() {
        let observer = Arc::new(MockObserver::new(vec![Some(app("Safari"))]));
        let activator = Arc::new(MockActivator::default());
        let (_cfg_tx, cfg_rx) = {
            let (tx, rx) = watch::channel(snapshot(true, "raise"));
            (Box::leak(Box::new(tx)), rx)
        };
        let paused = Arc::new(AtomicBool::new(true));
        let (tracker, settled) = FocusTracker::new(
            observer,
            activator.clone(),
            cfg_rx,
            fast_tuning(),
            paused.clone(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(tracker.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(settled.borrow().is_none());
        assert!(activator.activated.lock().unwrap().is_empty());

        // Releasing the key resumes tracking
        paused.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(settled.borrow().is_some());

        let _ = shutdown_tx.send(true);
        let _ = task.await;
    }
}
