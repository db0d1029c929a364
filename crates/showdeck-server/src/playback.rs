//! On-air state: the logo currently shown and the countdown timer.
//!
//! Every mutation goes through one lock, so surfaces never observe two logos
//! at once or a timer that outlived a reset.  Readers get a consistent
//! snapshot from a watch channel without touching that lock.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use showdeck_shared::constants::SET_DURATION_UNIT_MS;
use showdeck_shared::types::{validate_duration_ms, PlaybackPhase, TimerSettings};

use crate::error::{ServerError, StoreResultExt};
use crate::output::PlaybackOutput;
use crate::resolver::{LogoResolver, ResolvedLogo};
use crate::SharedDb;

/// Raised by the controller outside of any command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackNotice {
    TimerEnded { duration_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub remaining_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub phase: PlaybackPhase,
    pub current_logo: Option<ResolvedLogo>,
    pub is_playing: bool,
    pub timer: Option<TimerSnapshot>,
}

/// Result of a logo change, including a countdown it may have started.
#[derive(Debug, Clone)]
pub struct LogoChange {
    pub logo: ResolvedLogo,
    pub auto_timer_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTimerStatus {
    pub event_id: String,
    pub settings: Option<TimerSettings>,
    pub active: Option<TimerSnapshot>,
}

#[derive(Debug, Clone, Default)]
struct View {
    current_logo: Option<ResolvedLogo>,
    is_playing: bool,
    timer: Option<TimerView>,
}

#[derive(Debug, Clone, Copy)]
struct TimerView {
    duration: Duration,
    started_at: DateTime<Utc>,
    started: Instant,
}

struct ActiveTimer {
    view: TimerView,
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    current_logo: Option<ResolvedLogo>,
    is_playing: bool,
    timer: Option<ActiveTimer>,
    generation: u64,
}

impl Inner {
    fn view(&self) -> View {
        View {
            current_logo: self.current_logo.clone(),
            is_playing: self.is_playing,
            timer: self.timer.as_ref().map(|t| t.view),
        }
    }

    fn cancel_timer(&mut self) -> Option<Duration> {
        let timer = self.timer.take()?;
        timer.task.abort();
        Some(timer.view.duration)
    }
}

pub struct PlaybackController {
    inner: Mutex<Inner>,
    view: watch::Sender<View>,
    notices: broadcast::Sender<PlaybackNotice>,
    resolver: LogoResolver,
    output: Arc<dyn PlaybackOutput>,
    db: SharedDb,
    check_every: Duration,
}

impl PlaybackController {
    pub fn new(
        db: SharedDb,
        resolver: LogoResolver,
        output: Arc<dyn PlaybackOutput>,
        check_every: Duration,
    ) -> Arc<Self> {
        let (view, _) = watch::channel(View::default());
        let (notices, _) = broadcast::channel(16);
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            view,
            notices,
            resolver,
            output,
            db,
            check_every,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackNotice> {
        self.notices.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let view = self.view.borrow().clone();
        let timer = view.timer.map(|t| TimerSnapshot {
            duration_ms: t.duration.as_millis() as u64,
            started_at: t.started_at,
            remaining_ms: t.duration.saturating_sub(t.started.elapsed()).as_millis() as u64,
        });
        let phase = if timer.is_some() {
            PlaybackPhase::TimerRunning
        } else if view.is_playing {
            PlaybackPhase::Playing
        } else {
            PlaybackPhase::Idle
        };
        PlaybackSnapshot {
            phase,
            current_logo: view.current_logo,
            is_playing: view.is_playing,
            timer,
        }
    }

    fn publish(&self, inner: &Inner) {
        self.view.send_replace(inner.view());
    }

    /// Replace whatever is on air with `logo_id`.
    ///
    /// An unknown id leaves the current state untouched.  A running countdown
    /// keeps running unless the new logo's event has auto-start set.
    pub async fn change_logo(self: &Arc<Self>, logo_id: &str) -> Result<LogoChange, ServerError> {
        let logo = self
            .resolver
            .resolve(logo_id)
            .await?
            .ok_or_else(|| ServerError::not_found("Logo", logo_id))?;

        let auto_start = match &logo.event_id {
            Some(event_id) => self
                .db
                .lock()
                .await
                .get_timer_settings(event_id)?
                .filter(|s| s.auto_start),
            None => None,
        };

        let mut inner = self.inner.lock().await;
        if inner.is_playing {
            self.output.stop().await?;
            inner.is_playing = false;
            inner.current_logo = None;
        }
        if let Err(e) = self.output.play(&logo).await {
            self.publish(&inner);
            return Err(e.into());
        }
        inner.current_logo = Some(logo.clone());
        inner.is_playing = true;

        let mut auto_timer_ms = None;
        if let Some(settings) = auto_start {
            let ms = validate_duration_ms(settings.duration_ms)?;
            self.arm_timer(&mut inner, Duration::from_millis(ms));
            auto_timer_ms = Some(ms);
        }
        self.publish(&inner);

        info!(logo_id = %logo.id, auto_timer_ms = ?auto_timer_ms, "Logo changed");
        Ok(LogoChange {
            logo,
            auto_timer_ms,
        })
    }

    /// Start a countdown, replacing any running one.
    pub async fn start_timer(self: &Arc<Self>, duration_ms: i64) -> Result<u64, ServerError> {
        let ms = validate_duration_ms(duration_ms)?;
        let mut inner = self.inner.lock().await;
        self.arm_timer(&mut inner, Duration::from_millis(ms));
        self.publish(&inner);
        info!(duration_ms = ms, "Timer started");
        Ok(ms)
    }

    /// Start the countdown configured for an event.
    ///
    /// Stored timer settings win; otherwise the event's set length is used.
    pub async fn start_timer_for_event(self: &Arc<Self>, event_id: &str) -> Result<u64, ServerError> {
        let duration_ms = {
            let db = self.db.lock().await;
            let event = db.get_event(event_id).or_not_found("Event", event_id)?.event;
            match db.get_timer_settings(event_id)? {
                Some(settings) => settings.duration_ms,
                None => event
                    .set_duration
                    .map(|minutes| minutes.saturating_mul(SET_DURATION_UNIT_MS as i64))
                    .ok_or_else(|| {
                        ServerError::Validation(format!(
                            "event {event_id} has no timer settings or set duration"
                        ))
                    })?,
            }
        };
        self.start_timer(duration_ms).await
    }

    fn arm_timer(self: &Arc<Self>, inner: &mut Inner, duration: Duration) {
        inner.cancel_timer();
        inner.generation += 1;
        let generation = inner.generation;

        let controller: Weak<Self> = Arc::downgrade(self);
        let check_every = self.check_every;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                if controller.check_expiry(generation).await {
                    return;
                }
            }
        });

        inner.timer = Some(ActiveTimer {
            view: TimerView {
                duration,
                started_at: Utc::now(),
                started: Instant::now(),
            },
            generation,
            task,
        });
    }

    /// Returns `true` once the countdown of `generation` is over or gone.
    async fn check_expiry(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(timer) = inner.timer.as_ref() else {
            return true;
        };
        if timer.generation != generation {
            return true;
        }
        if timer.view.started.elapsed() < timer.view.duration {
            return false;
        }

        // Called from the timer's own task, so the handle is dropped, not aborted.
        let duration_ms = timer.view.duration.as_millis() as u64;
        inner.timer = None;
        self.publish(&inner);
        drop(inner);

        info!(duration_ms, "Timer ended");
        let _ = self.notices.send(PlaybackNotice::TimerEnded { duration_ms });
        true
    }

    /// Take the logo off air and cancel any countdown.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut inner = self.inner.lock().await;
        inner.cancel_timer();
        let was_playing = inner.is_playing;
        inner.is_playing = false;
        inner.current_logo = None;
        self.publish(&inner);
        if was_playing {
            self.output.stop().await?;
        }
        info!("Playback stopped");
        Ok(())
    }

    /// Cancel the running countdown.  Returns its configured duration.
    pub async fn reset_timer(&self) -> Result<u64, ServerError> {
        let mut inner = self.inner.lock().await;
        let duration = inner
            .cancel_timer()
            .ok_or_else(|| ServerError::Validation("no timer is running".into()))?;
        self.publish(&inner);
        let duration_ms = duration.as_millis() as u64;
        debug!(duration_ms, "Timer reset");
        Ok(duration_ms)
    }

    // ------------------------------------------------------------------
    // Per-event timer settings
    // ------------------------------------------------------------------

    pub async fn timer_status(&self, event_id: &str) -> Result<EventTimerStatus, ServerError> {
        let settings = {
            let db = self.db.lock().await;
            if !db.event_exists(event_id)? {
                return Err(ServerError::not_found("Event", event_id));
            }
            db.get_timer_settings(event_id)?
        };
        Ok(EventTimerStatus {
            event_id: event_id.to_string(),
            settings,
            active: self.snapshot().timer,
        })
    }

    pub async fn update_timer_settings(
        &self,
        event_id: &str,
        settings: TimerSettings,
    ) -> Result<TimerSettings, ServerError> {
        settings.validate()?;
        self.db
            .lock()
            .await
            .put_timer_settings(event_id, &settings)
            .or_not_found("Event", event_id)?;
        info!(event_id, duration_ms = settings.duration_ms, "Timer settings updated");
        Ok(settings)
    }

    /// Cancel timers and release the output.
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop().await {
            tracing::warn!(error = %e, "Output did not stop cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{remote_event, temp_db, RecordingOutput};

    const TICK: Duration = Duration::from_millis(250);

    async fn controller_with(
        logos: &[&str],
    ) -> (tempfile::TempDir, Arc<PlaybackController>, Arc<RecordingOutput>) {
        let (dir, db) = temp_db();
        let entry = remote_event("e1", 20, logos).into_catalog_entry(Utc::now());
        db.lock().await.reconcile_catalog(&[entry]).unwrap();

        let output = Arc::new(RecordingOutput::default());
        let resolver = LogoResolver::standard(db.clone(), dir.path().join("assets"));
        let controller = PlaybackController::new(db, resolver, output.clone(), TICK);
        (dir, controller, output)
    }

    #[tokio::test]
    async fn change_logo_swaps_exclusively() {
        let (_dir, ctrl, output) = controller_with(&["L1", "L2"]).await;

        ctrl.change_logo("L1").await.unwrap();
        ctrl.change_logo("L2").await.unwrap();

        let snap = ctrl.snapshot();
        assert_eq!(snap.phase, PlaybackPhase::Playing);
        assert_eq!(snap.current_logo.unwrap().id, "L2");
        assert_eq!(output.calls(), vec!["play:L1", "stop", "play:L2"]);
    }

    #[tokio::test]
    async fn unknown_logo_leaves_state_unchanged() {
        let (_dir, ctrl, output) = controller_with(&["L1"]).await;
        ctrl.change_logo("L1").await.unwrap();

        let err = ctrl.change_logo("nope").await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound { kind: "Logo", .. }));
        assert_eq!(ctrl.snapshot().current_logo.unwrap().id, "L1");
        assert_eq!(output.calls(), vec!["play:L1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expires_once_and_returns_to_playing() {
        let (_dir, ctrl, _output) = controller_with(&["L1"]).await;
        let mut notices = ctrl.subscribe();

        ctrl.change_logo("L1").await.unwrap();
        ctrl.start_timer(5000).await.unwrap();
        assert_eq!(ctrl.snapshot().phase, PlaybackPhase::TimerRunning);

        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(ctrl.snapshot().phase, PlaybackPhase::TimerRunning);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        let snap = ctrl.snapshot();
        assert_eq!(snap.phase, PlaybackPhase::Playing);
        assert!(snap.timer.is_none());

        assert_eq!(
            notices.try_recv().unwrap(),
            PlaybackNotice::TimerEnded { duration_ms: 5000 }
        );
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_timer_never_notifies() {
        let (_dir, ctrl, _output) = controller_with(&["L1"]).await;
        let mut notices = ctrl.subscribe();

        ctrl.start_timer(1000).await.unwrap();
        assert_eq!(ctrl.reset_timer().await.unwrap(), 1000);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(ctrl.snapshot().phase, PlaybackPhase::Idle);
        assert!(notices.try_recv().is_err());

        assert!(matches!(
            ctrl.reset_timer().await,
            Err(ServerError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_timer_supersedes_previous() {
        let (_dir, ctrl, _output) = controller_with(&[]).await;
        let mut notices = ctrl.subscribe();

        ctrl.start_timer(1000).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        ctrl.start_timer(2000).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(notices.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            notices.try_recv().unwrap(),
            PlaybackNotice::TimerEnded { duration_ms: 2000 }
        );
    }

    #[tokio::test]
    async fn invalid_durations_are_rejected() {
        let (_dir, ctrl, _output) = controller_with(&[]).await;
        assert!(matches!(ctrl.start_timer(0).await, Err(ServerError::Validation(_))));
        assert!(matches!(ctrl.start_timer(-5).await, Err(ServerError::Validation(_))));
        assert_eq!(ctrl.snapshot().phase, PlaybackPhase::Idle);
    }

    #[tokio::test]
    async fn stop_returns_to_idle() {
        let (_dir, ctrl, output) = controller_with(&["L1"]).await;
        ctrl.change_logo("L1").await.unwrap();
        ctrl.start_timer(60_000).await.unwrap();

        ctrl.stop().await.unwrap();
        let snap = ctrl.snapshot();
        assert_eq!(snap.phase, PlaybackPhase::Idle);
        assert!(snap.current_logo.is_none());
        assert_eq!(output.calls(), vec!["play:L1", "stop"]);

        // Stopping while idle is accepted and does not touch the output.
        ctrl.stop().await.unwrap();
        assert_eq!(output.calls().len(), 2);
    }

    #[tokio::test]
    async fn event_timer_uses_settings_then_set_duration() {
        let (_dir, ctrl, _output) = controller_with(&["L1"]).await;

        // remote_event sets a 45 minute set.
        assert_eq!(ctrl.start_timer_for_event("e1").await.unwrap(), 45 * 60_000);

        ctrl.update_timer_settings(
            "e1",
            TimerSettings {
                duration_ms: 90_000,
                warning_ms: Some(10_000),
                auto_start: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(ctrl.start_timer_for_event("e1").await.unwrap(), 90_000);

        let status = ctrl.timer_status("e1").await.unwrap();
        assert_eq!(status.settings.unwrap().duration_ms, 90_000);
        assert_eq!(status.active.unwrap().duration_ms, 90_000);

        assert!(matches!(
            ctrl.start_timer_for_event("ghost").await,
            Err(ServerError::NotFound { kind: "Event", .. })
        ));
    }

    #[tokio::test]
    async fn auto_start_arms_timer_on_logo_change() {
        let (_dir, ctrl, _output) = controller_with(&["L1"]).await;
        ctrl.update_timer_settings(
            "e1",
            TimerSettings {
                duration_ms: 30_000,
                warning_ms: None,
                auto_start: true,
            },
        )
        .await
        .unwrap();

        let change = ctrl.change_logo("L1").await.unwrap();
        assert_eq!(change.auto_timer_ms, Some(30_000));
        assert_eq!(ctrl.snapshot().phase, PlaybackPhase::TimerRunning);
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let (_dir, ctrl, _output) = controller_with(&[]).await;
        let err = ctrl
            .update_timer_settings(
                "e1",
                TimerSettings {
                    duration_ms: 1000,
                    warning_ms: Some(5000),
                    auto_start: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commands_keep_one_logo_and_one_timer() {
        let (_dir, ctrl, output) = controller_with(&["L1", "L2", "L3"]).await;

        let mut tasks = Vec::new();
        for round in 0..20 {
            let ctrl = ctrl.clone();
            tasks.push(tokio::spawn(async move {
                let logo = ["L1", "L2", "L3"][round % 3];
                tokio::join!(
                    ctrl.change_logo(logo),
                    ctrl.start_timer(60_000 + round as i64),
                    async {
                        if round % 4 == 0 {
                            ctrl.stop().await
                        } else {
                            ctrl.reset_timer().await.map(|_| ())
                        }
                    },
                )
            }));
        }
        for task in tasks {
            let (changed, started, _) = task.await.unwrap();
            changed.unwrap();
            started.unwrap();
        }

        // Output calls strictly alternate, so the booth never shows two logos.
        let calls = output.calls();
        for (i, call) in calls.iter().enumerate() {
            if i % 2 == 0 {
                assert!(call.starts_with("play:"), "call {i} was {call}: {calls:?}");
            } else {
                assert_eq!(call, "stop", "call {i}: {calls:?}");
            }
        }

        let snap = ctrl.snapshot();
        match calls.last() {
            Some(last) if last.starts_with("play:") => {
                assert!(snap.is_playing);
                assert_eq!(format!("play:{}", snap.current_logo.unwrap().id), *last);
            }
            _ => {
                assert!(!snap.is_playing);
                assert!(snap.current_logo.is_none());
            }
        }
        if let Some(timer) = &snap.timer {
            assert!((60_000..60_020).contains(&timer.duration_ms));
        }

        // A single timer task survives; the final reset leaves none running.
        if snap.timer.is_some() {
            ctrl.reset_timer().await.unwrap();
        }
        assert!(ctrl.reset_timer().await.is_err());
    }
}
