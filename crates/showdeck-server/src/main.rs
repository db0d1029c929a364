//! # showdeck-server
//!
//! Show-control hub for a live DJ/VJ set.
//!
//! This binary provides:
//! - **Event catalog cache** pulled from the remote VJ tools API, kept in
//!   SQLite so the show keeps running when the network drops
//! - **Playback controller** that puts logos on air and runs set countdowns
//! - **OSC bridge** (UDP) for lighting desks and controllers
//! - **WebSocket channel** for the browser surfaces, with presence and
//!   direct messaging between the booth operators
//! - **REST API** (axum) mirroring every control operation

mod api;
mod bridge;
mod capabilities;
mod config;
mod error;
mod messaging;
mod osc;
mod output;
mod playback;
mod presence;
mod remote;
mod resolver;
mod sync;
#[cfg(test)]
mod testing;
mod ws;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use showdeck_store::Database;

use crate::api::AppState;
use crate::bridge::{ControlBridge, Services};
use crate::capabilities::Capabilities;
use crate::config::ServerConfig;
use crate::messaging::Messaging;
use crate::output::{CommandOutput, LogOutput, PlaybackOutput};
use crate::playback::PlaybackController;
use crate::presence::PresenceRegistry;
use crate::remote::HttpCatalog;
use crate::resolver::LogoResolver;
use crate::sync::SyncEngine;

/// The local cache, shared by every component that reads or writes it.
pub type SharedDb = Arc<tokio::sync::Mutex<Database>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,showdeck_server=debug")),
        )
        .init();

    info!("Starting Showdeck server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Local cache (creates the data directory if missing)
    let database = match &config.data_dir {
        Some(dir) => Database::open_in_dir(dir)?,
        None => Database::new()?,
    };
    let db: SharedDb = Arc::new(tokio::sync::Mutex::new(database));

    let remote = Arc::new(HttpCatalog::new(&config)?);
    let sync = SyncEngine::new(db.clone(), remote, config.sync_interval);

    let output: Arc<dyn PlaybackOutput> = match &config.player_cmd {
        Some(program) => Arc::new(CommandOutput::new(program.clone())),
        None => Arc::new(LogOutput),
    };
    let resolver = LogoResolver::standard(db.clone(), config.assets_dir.clone());
    let playback = PlaybackController::new(db.clone(), resolver, output, config.timer_check);

    let services = Services {
        sync: sync.clone(),
        presence: Arc::new(PresenceRegistry::new(db.clone())),
        messaging: Arc::new(Messaging::new(db, config.history_cache_conversations)),
        playback: playback.clone(),
        capabilities: Arc::new(Capabilities::new(config.osc_enabled, config.ndi_enabled)),
    };

    let (osc_tx, osc_rx) = mpsc::unbounded_channel();
    let bridge = ControlBridge::new(services, osc_tx);

    let app_state = AppState {
        bridge: bridge.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Timer expiry notices to WebSocket and OSC clients
    let _relay = bridge.spawn_notice_relay();

    // Periodic catalog pull, first run immediately
    sync.start().await;

    // -----------------------------------------------------------------------
    // 5. Start the OSC bridge (listener and sender run in background tasks)
    // -----------------------------------------------------------------------
    let (_osc_listener, _osc_sender) = osc::spawn(&config, bridge, osc_rx).await?;

    // -----------------------------------------------------------------------
    // 6. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let result = tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "HTTP server failed");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    sync.shutdown().await;
    playback.shutdown().await;

    result
}
