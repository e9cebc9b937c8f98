//! Recording session state machine
//!
//! The coordinator owns the authoritative session state and every
//! transition in and out of it. Key signals, the watchdog, and the
//! dispatch task all funnel through here; the state lives behind one
//! mutex that is held only to inspect or mutate, never across I/O.
//!
//! Transitions:
//!
//! ```text
//! Idle --trigger satisfied--> Recording
//! Recording --released (>= min)--> Processing --dispatch done--> Idle
//! Recording --released (< min)---> Idle            (discarded tap)
//! Recording --watchdog---------> Processing        (forced stop)
//! Recording --foreign key------> Cancelled --all released--> Idle
//! ```
//!
//! The cancelled latch keeps the trigger disarmed until every trigger key
//! has been released, so wiggling the combination mid-cancel cannot start
//! a ghost recording.

use crate::audio::{AudioCapture, CapturePort};
use crate::config::ConfigSnapshot;
use crate::delivery::{Delivery, DeliveryOutcome};
use crate::focus::FocusCandidate;
use crate::indicator::{Indicator, IndicatorState};
use crate::server::{ServerClient, Transcriber};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration, Instant, MissedTickBehavior};

/// Watchdog poll interval while a recording is live
const WATCHDOG_TICK: Duration = Duration::from_millis(250);
/// How long the error indicator stays up after a failed transcription
const ERROR_FLASH: Duration = Duration::from_secs(2);

/// Authoritative session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No recording; trigger armed (unless the cancel latch is set)
    Idle,
    /// Microphone open, samples accumulating
    Recording,
    /// Aborted by a foreign key; waits for all keys up before re-arming
    Cancelled,
    /// Samples in flight to the transcription server
    Processing,
}

/// Events injected into the daemon loop by background timers.
///
/// The watchdog never mutates state itself; it reports through the same
/// channel the key listener uses, so the single consumer decides whether
/// the forced stop still applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    WatchdogFired { session_id: u64 },
}

struct Inner {
    state: SessionState,
    /// Incremented on every recording start; stale watchdog events carry
    /// an old id and are dropped
    session_id: u64,
    started_at: Option<Instant>,
    cancelled_latch: bool,
    capture: Option<Box<dyn AudioCapture>>,
}

/// Coordinates one recording session at a time
pub struct SessionCoordinator {
    /// Self-handle for the detached watchdog and dispatch tasks
    this: Weak<Self>,
    inner: Mutex<Inner>,
    port: Arc<dyn CapturePort>,
    transcriber: Arc<dyn Transcriber>,
    server: Arc<ServerClient>,
    delivery: Arc<Delivery>,
    indicator: Arc<dyn Indicator>,
    config: watch::Receiver<ConfigSnapshot>,
    focus: watch::Receiver<Option<FocusCandidate>>,
    events_tx: mpsc::Sender<SessionEvent>,
    sample_rate: u32,
}

impl SessionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        port: Arc<dyn CapturePort>,
        transcriber: Arc<dyn Transcriber>,
        server: Arc<ServerClient>,
        delivery: Arc<Delivery>,
        indicator: Arc<dyn Indicator>,
        config: watch::Receiver<ConfigSnapshot>,
        focus: watch::Receiver<Option<FocusCandidate>>,
        events_tx: mpsc::Sender<SessionEvent>,
        sample_rate: u32,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                session_id: 0,
                started_at: None,
                cancelled_latch: false,
                capture: None,
            }),
            port,
            transcriber,
            server,
            delivery,
            indicator,
            config,
            focus,
            events_tx,
            sample_rate,
        })
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        // State is plain data; a panic while holding the lock leaves
        // nothing half-written worth poisoning over
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    /// Trigger combination satisfied: start recording if armed.
    ///
    /// The device open happens outside the lock (it can take a while and
    /// retries internally); the recording indicator is shown only once a
    /// device actually opened, so an open failure leaves the screen
    /// untouched and the state in Idle.
    pub async fn on_trigger_satisfied(&self) {
        {
            let inner = self.lock_inner();
            if inner.state != SessionState::Idle || inner.cancelled_latch {
                tracing::trace!("Trigger ignored in state {:?}", inner.state);
                return;
            }
        }

        let snapshot = self.config.borrow().clone();
        match self.port.open().await {
            Ok(capture) => {
                let session_id = {
                    let mut inner = self.lock_inner();
                    if inner.state != SessionState::Idle || inner.cancelled_latch {
                        // A cancel won the race while the device opened
                        drop(inner);
                        Self::discard(Some(capture));
                        return;
                    }
                    inner.state = SessionState::Recording;
                    inner.session_id += 1;
                    inner.started_at = Some(Instant::now());
                    inner.capture = Some(capture);
                    inner.session_id
                };
                self.indicator.show(IndicatorState::Recording);
                self.broadcast_status(true, false);
                tracing::info!("Recording started (session {})", session_id);
                self.spawn_watchdog(session_id, snapshot.max_duration);
            }
            Err(e) => {
                tracing::error!("Could not open audio device: {}", e);
                self.post_log_detached("error", format!("Could not open audio device: {}", e));
            }
        }
    }

    /// Trigger combination released: stop recording and dispatch
    pub async fn on_trigger_released(&self) {
        self.finish_recording(false).await;
    }

    /// A non-trigger key pressed while recording: abort and latch.
    ///
    /// Idempotent; repeated foreign keys while already cancelled change
    /// nothing. The buffered samples are discarded and the stream closed
    /// in the background so the key handler never blocks on the driver.
    pub fn on_foreign_key(&self) {
        let capture = {
            let mut inner = self.lock_inner();
            if inner.state != SessionState::Recording {
                return;
            }
            inner.state = SessionState::Cancelled;
            inner.cancelled_latch = true;
            inner.started_at = None;
            inner.capture.take()
        };
        tracing::info!("Recording cancelled");
        self.indicator.show(IndicatorState::Hidden);
        self.broadcast_status(false, true);
        Self::discard(capture);
    }

    /// Every trigger key is up again: clear the cancel latch and re-arm
    pub fn on_all_keys_released(&self) {
        let mut inner = self.lock_inner();
        if inner.state == SessionState::Cancelled {
            inner.state = SessionState::Idle;
            inner.cancelled_latch = false;
            tracing::debug!("Cancel cleared, trigger re-armed");
        }
    }

    /// Watchdog event from the daemon loop. Stale events (old session id,
    /// or a release/cancel already observed) are dropped; because the loop
    /// is the single consumer, whichever signal it saw first wins.
    ///
    /// Returns true when the stop was actually forced, so the caller knows
    /// whether its own key-tracking state needs resetting.
    pub async fn on_watchdog(&self, session_id: u64) -> bool {
        {
            let inner = self.lock_inner();
            if inner.state != SessionState::Recording || inner.session_id != session_id {
                tracing::trace!("Stale watchdog event for session {}", session_id);
                return false;
            }
        }
        tracing::warn!("Maximum recording duration reached, forcing stop");
        self.finish_recording(true).await;
        true
    }

    /// Shared stop path for release and watchdog.
    ///
    /// Decides the transition under the lock, then performs indicator
    /// updates and the bounded stream close outside it. Indicator updates
    /// come before the close so feedback is immediate even when the driver
    /// drags its feet.
    async fn finish_recording(&self, forced: bool) {
        let snapshot = self.config.borrow().clone();

        enum Stop {
            Short {
                capture: Option<Box<dyn AudioCapture>>,
                elapsed: Duration,
            },
            Dispatch {
                capture: Option<Box<dyn AudioCapture>>,
                elapsed: Duration,
            },
        }

        let decision = {
            let mut inner = self.lock_inner();
            if inner.state != SessionState::Recording {
                return;
            }
            let elapsed = inner
                .started_at
                .take()
                .map(|t| t.elapsed())
                .unwrap_or_default();
            let capture = inner.capture.take();
            if !forced && elapsed < snapshot.min_duration {
                inner.state = SessionState::Idle;
                Stop::Short { capture, elapsed }
            } else {
                inner.state = SessionState::Processing;
                Stop::Dispatch { capture, elapsed }
            }
        };

        match decision {
            Stop::Short { capture, elapsed } => {
                tracing::debug!(
                    "Recording too short ({} ms), discarded",
                    elapsed.as_millis()
                );
                self.indicator.show(IndicatorState::Hidden);
                self.broadcast_status(false, false);
                Self::discard(capture);
            }
            Stop::Dispatch { capture, elapsed } => {
                tracing::info!("Recording stopped after {:.2}s", elapsed.as_secs_f32());
                self.indicator.show(IndicatorState::Processing);
                self.broadcast_status(false, false);

                let Some(mut capture) = capture else {
                    self.lock_inner().state = SessionState::Idle;
                    self.indicator.show(IndicatorState::Hidden);
                    return;
                };
                match capture.stop().await {
                    Ok(samples) => self.spawn_dispatch(samples, snapshot),
                    Err(e) => {
                        tracing::error!("Audio capture failed: {}", e);
                        self.post_log_detached("error", format!("Audio capture failed: {}", e));
                        self.lock_inner().state = SessionState::Idle;
                        self.indicator.show(IndicatorState::Hidden);
                    }
                }
            }
        }
    }

    /// Per-session deadline timer. Exits quietly as soon as the session it
    /// was started for is no longer the live recording.
    fn spawn_watchdog(&self, session_id: u64, max_duration: Duration) {
        let Some(coordinator) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WATCHDOG_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired = {
                    let inner = coordinator.lock_inner();
                    if inner.state != SessionState::Recording || inner.session_id != session_id
                    {
                        return;
                    }
                    inner
                        .started_at
                        .map_or(false, |started| started.elapsed() >= max_duration)
                };
                if expired {
                    let _ = coordinator
                        .events_tx
                        .send(SessionEvent::WatchdogFired { session_id })
                        .await;
                    return;
                }
            }
        });
    }

    /// Detached transcribe-and-deliver task. Whatever happens inside, the
    /// session ends Idle with the indicator hidden.
    fn spawn_dispatch(&self, samples: Vec<f32>, snapshot: ConfigSnapshot) {
        let Some(coordinator) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            coordinator.dispatch(samples, snapshot).await;
            coordinator.lock_inner().state = SessionState::Idle;
            coordinator.indicator.show(IndicatorState::Hidden);
        });
    }

    async fn dispatch(&self, samples: Vec<f32>, snapshot: ConfigSnapshot) {
        // Snapshot the focus candidate once; delivery must not chase the
        // pointer after dispatch
        let focus = self.focus.borrow().clone();

        let transcriber = self.transcriber.clone();
        let language = snapshot.language.clone();
        let sample_rate = self.sample_rate;
        let result = tokio::task::spawn_blocking(move || {
            transcriber.transcribe(&samples, sample_rate, language.as_deref())
        })
        .await;

        match result {
            Ok(Ok(transcription)) if transcription.text.is_empty() => {
                tracing::info!("No speech detected");
            }
            Ok(Ok(transcription)) => {
                tracing::info!("Transcribed: {:?}", transcription.text);
                match self
                    .delivery
                    .deliver(&transcription.text, focus, &snapshot)
                    .await
                {
                    Ok(DeliveryOutcome::Pasted) => {}
                    Ok(DeliveryOutcome::LeftOnClipboard(reason)) => {
                        self.post_log_detached(
                            "warning",
                            format!("Paste failed ({}); text left on clipboard", reason),
                        );
                    }
                    Err(e) => {
                        tracing::error!("Delivery failed: {}", e);
                        self.post_log_detached("error", format!("Delivery failed: {}", e));
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::error!("Transcription failed: {}", e);
                self.indicator.show(IndicatorState::Error);
                sleep(ERROR_FLASH).await;
            }
            Err(e) => {
                tracing::error!("Transcription task failed: {}", e);
            }
        }
    }

    /// Close a no-longer-wanted stream off the hot path, dropping whatever
    /// it buffered
    fn discard(capture: Option<Box<dyn AudioCapture>>) {
        let Some(mut capture) = capture else { return };
        tokio::spawn(async move {
            if let Err(e) = capture.stop().await {
                tracing::debug!("Discarded capture close: {}", e);
            }
        });
    }

    fn broadcast_status(&self, recording: bool, cancelled: bool) {
        let server = self.server.clone();
        tokio::task::spawn_blocking(move || server.post_status(recording, cancelled));
    }

    fn post_log_detached(&self, level: &'static str, message: String) {
        let server = self.server.clone();
        tokio::task::spawn_blocking(move || server.post_log(level, &message));
    }
}
