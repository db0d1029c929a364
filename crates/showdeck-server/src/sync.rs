//! Catalog synchronisation between the remote catalog and the local cache.
//!
//! The remote catalog is authoritative.  Pulls overwrite local rows by id and
//! never delete.  When the catalog cannot be reached every read is served from
//! the cache and the engine reports itself as offline until the next
//! successful pull.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use showdeck_shared::types::SyncMode;
use showdeck_store::{CatalogEntry, EventWithLogos, Logo};

use crate::error::{ServerError, StoreResultExt};
use crate::remote::{RemoteCatalog, RemoteEvent};
use crate::SharedDb;

/// Result of a completed pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub events: usize,
    pub logos: usize,
    pub synced_at: DateTime<Utc>,
}

/// Partial edit of an event.  Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub artist_name: Option<String>,
    pub set_duration: Option<i64>,
}

impl EventPatch {
    fn apply(self, event: &mut RemoteEvent) -> Result<(), ServerError> {
        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err(ServerError::Validation("title must not be empty".into()));
            }
            event.title = title;
        }
        if let Some(start) = self.start_time {
            event.start_time = start;
        }
        if let Some(end) = self.end_time {
            event.end_time = end;
        }
        if let Some(artist) = self.artist_name {
            event.artist_name = Some(artist);
        }
        if let Some(minutes) = self.set_duration {
            if minutes <= 0 {
                return Err(ServerError::Validation(format!(
                    "set_duration must be positive, got {minutes}"
                )));
            }
            event.set_duration = Some(minutes);
        }
        if event.end_time < event.start_time {
            return Err(ServerError::Validation(
                "end_time must not be before start_time".into(),
            ));
        }
        Ok(())
    }
}

/// A logo attached to an event by an operator.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLogo {
    pub path: String,
    #[serde(rename = "type", default = "default_logo_type")]
    pub logo_type: String,
}

fn default_logo_type() -> String {
    "default".to_string()
}

pub struct SyncEngine {
    db: SharedDb,
    remote: Arc<dyn RemoteCatalog>,
    mode: RwLock<SyncMode>,
    /// Serialises reconciliation passes.
    reconcile: Mutex<()>,
    /// Serialises offline-mode toggles.
    toggle: Mutex<()>,
    schedule: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl SyncEngine {
    pub fn new(db: SharedDb, remote: Arc<dyn RemoteCatalog>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            db,
            remote,
            mode: RwLock::new(SyncMode::default()),
            reconcile: Mutex::new(()),
            toggle: Mutex::new(()),
            schedule: Mutex::new(None),
            interval,
        })
    }

    /// Start the periodic pull.  The first pull runs immediately.
    pub async fn start(self: &Arc<Self>) {
        if self.mode.read().await.offline_mode {
            info!("Offline mode set, periodic sync not started");
            return;
        }
        let handle = self.spawn_schedule(Instant::now());
        if let Some(previous) = self.schedule.lock().await.replace(handle) {
            previous.abort();
        }
        info!(interval_secs = self.interval.as_secs(), "Periodic sync started");
    }

    /// Stop the periodic pull and wait for it to wind down.
    pub async fn shutdown(&self) {
        let handle = self.schedule.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    fn spawn_schedule(self: &Arc<Self>, first_tick: Instant) -> JoinHandle<()> {
        let engine: Weak<Self> = Arc::downgrade(self);
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if engine.mode.read().await.offline_mode {
                    break;
                }
                match engine.pull().await {
                    Ok(report) => debug!(events = report.events, "Scheduled pull completed"),
                    Err(e) => warn!(error = %e, "Scheduled pull failed"),
                }
            }
        })
    }

    pub async fn mode(&self) -> SyncMode {
        *self.mode.read().await
    }

    /// Operator-triggered pull.  Refused while offline mode is set.
    pub async fn pull_and_reconcile(&self) -> Result<SyncReport, ServerError> {
        if self.mode.read().await.offline_mode {
            return Err(ServerError::Conflict(
                "Offline mode is enabled, sync is suspended".into(),
            ));
        }
        self.pull().await
    }

    async fn pull(&self) -> Result<SyncReport, ServerError> {
        let _pass = self.reconcile.lock().await;

        let fetched = match self.remote.fetch_events().await {
            Ok(events) => events,
            Err(e) => {
                self.mark_unreachable().await;
                warn!(error = %e, "Catalog pull failed, serving cached data");
                return Err(e.into());
            }
        };

        let synced_at = Utc::now();
        let entries: Vec<CatalogEntry> = fetched
            .into_iter()
            .map(|e| e.into_catalog_entry(synced_at))
            .collect();

        let stats = {
            let mut db = self.db.lock().await;
            db.reconcile_catalog(&entries)?
        };

        {
            let mut mode = self.mode.write().await;
            mode.is_online = !mode.offline_mode;
            mode.last_sync = Some(synced_at);
        }

        info!(events = stats.events, logos = stats.logos, "Catalog synced");
        Ok(SyncReport {
            events: stats.events,
            logos: stats.logos,
            synced_at,
        })
    }

    async fn mark_unreachable(&self) {
        self.mode.write().await.is_online = false;
    }

    /// Toggle the operator override.
    ///
    /// Enabling stops the periodic pull; no pull starts after this returns.
    /// Disabling always runs one pull right away, which also forces a
    /// reconnect after automatic failures, and resumes the schedule if it is
    /// not running.  Toggles are applied one at a time.
    pub async fn set_offline_mode(self: &Arc<Self>, enabled: bool) -> Result<SyncMode, ServerError> {
        let _toggle = self.toggle.lock().await;

        if enabled {
            {
                let mut mode = self.mode.write().await;
                mode.offline_mode = true;
                mode.is_online = false;
            }
            let handle = self.schedule.lock().await.take();
            if let Some(handle) = handle {
                handle.abort();
                let _ = handle.await;
            }
            info!("Offline mode enabled");
        } else {
            self.mode.write().await.offline_mode = false;
            {
                let mut schedule = self.schedule.lock().await;
                let running = schedule.as_ref().is_some_and(|h| !h.is_finished());
                if !running {
                    *schedule = Some(self.spawn_schedule(Instant::now() + self.interval));
                }
            }
            if let Err(e) = self.pull().await {
                warn!(error = %e, "Pull after leaving offline mode failed");
            }
            info!("Offline mode disabled");
        }
        Ok(self.mode().await)
    }

    // ------------------------------------------------------------------
    // Cache reads
    // ------------------------------------------------------------------

    pub async fn get_events(&self) -> Result<Vec<EventWithLogos>, ServerError> {
        Ok(self.db.lock().await.list_events()?)
    }

    pub async fn get_event(&self, id: &str) -> Result<EventWithLogos, ServerError> {
        self.db.lock().await.get_event(id).or_not_found("Event", id)
    }

    pub async fn get_logos(&self) -> Result<Vec<Logo>, ServerError> {
        Ok(self.db.lock().await.list_logos()?)
    }

    pub async fn get_logos_by_event(&self, event_id: &str) -> Result<Vec<Logo>, ServerError> {
        let db = self.db.lock().await;
        if !db.event_exists(event_id)? {
            return Err(ServerError::not_found("Event", event_id));
        }
        Ok(db.list_logos_for_event(event_id)?)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Push an edit upstream, then mirror the catalog's answer locally.
    pub async fn update_event(
        &self,
        id: &str,
        patch: EventPatch,
    ) -> Result<EventWithLogos, ServerError> {
        if self.mode.read().await.offline_mode {
            return Err(ServerError::Conflict(
                "Offline mode is enabled, events cannot be edited".into(),
            ));
        }

        let current = self.get_event(id).await?;
        let mut edited = RemoteEvent::from(&current.event);
        patch.apply(&mut edited)?;

        let stored = match self.remote.push_event(&edited).await {
            Ok(stored) => stored,
            Err(e) => {
                self.mark_unreachable().await;
                warn!(event_id = id, error = %e, "Event push failed");
                return Err(e.into());
            }
        };

        let entry = stored.into_catalog_entry(Utc::now());
        {
            let _pass = self.reconcile.lock().await;
            self.db.lock().await.reconcile_catalog(&[entry])?;
        }
        info!(event_id = id, "Event updated");
        self.get_event(id).await
    }

    pub async fn add_logo(&self, event_id: &str, logo: NewLogo) -> Result<Logo, ServerError> {
        if logo.path.trim().is_empty() {
            return Err(ServerError::Validation("logo path must not be empty".into()));
        }
        let logo = Logo {
            id: Uuid::new_v4().to_string(),
            event_id: event_id.to_string(),
            path: logo.path,
            logo_type: logo.logo_type,
        };
        self.db.lock().await.upsert_logo(&logo).map_err(|e| match e {
            showdeck_store::StoreError::OrphanLogo { .. } => ServerError::not_found("Event", event_id),
            other => other.into(),
        })?;
        info!(logo_id = %logo.id, event_id, "Logo added");
        Ok(logo)
    }

    pub async fn delete_logo(&self, id: &str) -> Result<(), ServerError> {
        if !self.db.lock().await.delete_logo(id)? {
            return Err(ServerError::not_found("Logo", id));
        }
        info!(logo_id = id, "Logo deleted");
        Ok(())
    }
}
