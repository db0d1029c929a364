//! Fakes and fixtures shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use rosc::OscMessage;
use tempfile::TempDir;
use tokio::sync::mpsc;

use showdeck_store::Database;

use crate::bridge::{ControlBridge, Services};
use crate::capabilities::Capabilities;
use crate::messaging::Messaging;
use crate::output::{OutputError, PlaybackOutput};
use crate::playback::PlaybackController;
use crate::presence::PresenceRegistry;
use crate::remote::{RemoteCatalog, RemoteError, RemoteEvent, RemoteLogo};
use crate::resolver::{LogoResolver, ResolvedLogo};
use crate::sync::SyncEngine;
use crate::SharedDb;

pub fn temp_db() -> (TempDir, SharedDb) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_in_dir(dir.path()).unwrap();
    (dir, Arc::new(tokio::sync::Mutex::new(db)))
}

pub fn remote_event(id: &str, hour: u32, logos: &[&str]) -> RemoteEvent {
    RemoteEvent {
        id: id.to_string(),
        title: format!("Set {id}"),
        start_time: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
        end_time: Utc.with_ymd_and_hms(2024, 6, 1, hour + 1, 0, 0).unwrap(),
        artist_name: Some("Artist".into()),
        set_duration: Some(45),
        logos: logos
            .iter()
            .map(|l| RemoteLogo {
                id: l.to_string(),
                path: format!("/logos/{l}.png"),
                logo_type: "default".into(),
            })
            .collect(),
    }
}

/// In-memory catalog that counts calls and can be switched to failing.
#[derive(Default)]
pub struct FakeCatalog {
    events: Mutex<Vec<RemoteEvent>>,
    pushed: Mutex<Vec<RemoteEvent>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_events(events: Vec<RemoteEvent>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(events),
            ..Default::default()
        })
    }

    pub fn set_events(&self, events: Vec<RemoteEvent>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn pushed(&self) -> Vec<RemoteEvent> {
        self.pushed.lock().unwrap().clone()
    }
}

impl RemoteCatalog for FakeCatalog {
    fn fetch_events(&self) -> BoxFuture<'_, Result<Vec<RemoteEvent>, RemoteError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(RemoteError::Status(503));
            }
            Ok(self.events.lock().unwrap().clone())
        })
    }

    fn push_event<'a>(
        &'a self,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, Result<RemoteEvent, RemoteError>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(RemoteError::Status(503));
            }
            self.pushed.lock().unwrap().push(event.clone());
            Ok(event.clone())
        })
    }
}

/// Output sink recording `play:<id>` and `stop` calls in order.
#[derive(Default)]
pub struct RecordingOutput {
    calls: Mutex<Vec<String>>,
}

impl RecordingOutput {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PlaybackOutput for RecordingOutput {
    fn play<'a>(&'a self, logo: &'a ResolvedLogo) -> BoxFuture<'a, Result<(), OutputError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(format!("play:{}", logo.id));
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), OutputError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push("stop".to_string());
            Ok(())
        })
    }
}

/// A fully wired bridge over a temp cache holding event `e1` with `logos`.
pub struct TestServices {
    pub _dir: TempDir,
    pub bridge: Arc<ControlBridge>,
    pub osc_rx: mpsc::UnboundedReceiver<OscMessage>,
    pub remote: Arc<FakeCatalog>,
    pub output: Arc<RecordingOutput>,
}

pub async fn services(logos: &[&str]) -> TestServices {
    let (dir, db) = temp_db();
    let remote = FakeCatalog::with_events(vec![remote_event("e1", 20, logos)]);
    let sync = SyncEngine::new(db.clone(), remote.clone(), Duration::from_secs(300));
    sync.pull_and_reconcile().await.unwrap();

    let output = Arc::new(RecordingOutput::default());
    let resolver = LogoResolver::standard(db.clone(), dir.path().join("assets"));
    let playback = PlaybackController::new(
        db.clone(),
        resolver,
        output.clone(),
        Duration::from_millis(250),
    );

    let services = Services {
        sync,
        presence: Arc::new(PresenceRegistry::new(db.clone())),
        messaging: Arc::new(Messaging::new(db, 8)),
        playback,
        capabilities: Arc::new(Capabilities::new(true, false)),
    };
    let (osc_tx, osc_rx) = mpsc::unbounded_channel();

    TestServices {
        _dir: dir,
        bridge: ControlBridge::new(services, osc_tx),
        osc_rx,
        remote,
        output,
    }
}
