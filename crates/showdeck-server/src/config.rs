//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use showdeck_shared::constants::{
    DEFAULT_HISTORY_CACHE_CONVERSATIONS, DEFAULT_HTTP_PORT, DEFAULT_OSC_CLIENT_PORT,
    DEFAULT_OSC_LISTEN_PORT, DEFAULT_REMOTE_API_URL, DEFAULT_REMOTE_TIMEOUT_SECS,
    DEFAULT_SYNC_INTERVAL_SECS, DEFAULT_TIMER_CHECK_MS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket API.
    /// Env: `HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// UDP address inbound OSC commands are read from.
    /// Env: `OSC_LISTEN_ADDR`
    pub osc_listen_addr: SocketAddr,

    /// UDP address OSC status and update messages are sent to.
    /// Env: `OSC_CLIENT_ADDR`
    pub osc_client_addr: SocketAddr,

    /// Initial state of the `osc` capability.
    /// Env: `OSC_ENABLED` (true/false)
    pub osc_enabled: bool,

    /// Initial state of the `ndi` capability.
    /// Env: `NDI_ENABLED` (true/false)
    pub ndi_enabled: bool,

    /// Base URL of the remote event catalog.
    /// Env: `REMOTE_API_URL`
    pub remote_api_url: String,

    /// Bearer token for the remote catalog.
    /// Env: `VJ_TOOLS_API_KEY`
    pub remote_api_key: Option<String>,

    /// Per-request timeout for the remote catalog.
    /// Env: `REMOTE_TIMEOUT_SECS`
    pub remote_timeout: Duration,

    /// Period of the background catalog pull.
    /// Env: `SYNC_INTERVAL_SECS`
    pub sync_interval: Duration,

    /// Directory holding the SQLite cache.  `None` uses the platform data dir.
    /// Env: `DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Fallback directory for logos that are not in the catalog.
    /// Env: `ASSETS_DIR`
    pub assets_dir: PathBuf,

    /// Cadence of the countdown expiry check.
    /// Env: `TIMER_CHECK_MS`
    pub timer_check: Duration,

    /// Number of conversation histories kept in memory.
    /// Env: `HISTORY_CACHE_CONVERSATIONS`
    pub history_cache_conversations: usize,

    /// External player launched with the logo path as its only argument.
    /// Env: `PLAYER_CMD`
    pub player_cmd: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            osc_listen_addr: ([127, 0, 0, 1], DEFAULT_OSC_LISTEN_PORT).into(),
            osc_client_addr: ([127, 0, 0, 1], DEFAULT_OSC_CLIENT_PORT).into(),
            osc_enabled: true,
            ndi_enabled: false,
            remote_api_url: DEFAULT_REMOTE_API_URL.to_string(),
            remote_api_key: None,
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            data_dir: None,
            assets_dir: PathBuf::from("./assets/logos"),
            timer_check: Duration::from_millis(DEFAULT_TIMER_CHECK_MS),
            history_cache_conversations: DEFAULT_HISTORY_CACHE_CONVERSATIONS,
            player_cmd: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&var, "HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Some(addr) = parse_var(&var, "OSC_LISTEN_ADDR") {
            config.osc_listen_addr = addr;
        }
        if let Some(addr) = parse_var(&var, "OSC_CLIENT_ADDR") {
            config.osc_client_addr = addr;
        }

        if let Some(val) = var("OSC_ENABLED") {
            config.osc_enabled = parse_flag(&val);
        }
        if let Some(val) = var("NDI_ENABLED") {
            config.ndi_enabled = parse_flag(&val);
        }

        if let Some(url) = var("REMOTE_API_URL") {
            config.remote_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = var("VJ_TOOLS_API_KEY") {
            if !key.is_empty() {
                config.remote_api_key = Some(key);
            }
        }

        if let Some(secs) = parse_var::<u64>(&var, "REMOTE_TIMEOUT_SECS") {
            config.remote_timeout = Duration::from_secs(secs);
        }
        match parse_var::<u64>(&var, "SYNC_INTERVAL_SECS") {
            Some(0) => tracing::warn!("SYNC_INTERVAL_SECS must be positive, using default"),
            Some(secs) => config.sync_interval = Duration::from_secs(secs),
            None => {}
        }
        match parse_var::<u64>(&var, "TIMER_CHECK_MS") {
            Some(0) => tracing::warn!("TIMER_CHECK_MS must be positive, using default"),
            Some(ms) => config.timer_check = Duration::from_millis(ms),
            None => {}
        }
        if let Some(n) = parse_var::<usize>(&var, "HISTORY_CACHE_CONVERSATIONS") {
            config.history_cache_conversations = n.max(1);
        }

        if let Some(dir) = var("DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = var("ASSETS_DIR") {
            config.assets_dir = PathBuf::from(dir);
        }
        if let Some(cmd) = var("PLAYER_CMD") {
            if !cmd.is_empty() {
                config.player_cmd = Some(PathBuf::from(cmd));
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_var<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val != "false" && val != "0"
}
