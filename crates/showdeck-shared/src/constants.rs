/// Application name
pub const APP_NAME: &str = "Showdeck";

/// SQLite cache file name, placed inside the data directory
pub const DB_FILE_NAME: &str = "showdeck.db";

/// Default HTTP/WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default UDP port the OSC listener binds to
pub const DEFAULT_OSC_LISTEN_PORT: u16 = 12345;

/// Default UDP port OSC status and update messages are sent to
pub const DEFAULT_OSC_CLIENT_PORT: u16 = 12346;

/// Default remote catalog base URL
pub const DEFAULT_REMOTE_API_URL: &str = "https://api.vj.tools";

/// Periodic catalog pull interval in seconds (5 minutes)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Remote request timeout in seconds
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 15;

/// Cadence of the timer expiry check in milliseconds
pub const DEFAULT_TIMER_CHECK_MS: u64 = 250;

/// Number of conversation histories kept in memory
pub const DEFAULT_HISTORY_CACHE_CONVERSATIONS: usize = 64;

/// Largest OSC datagram accepted
pub const MAX_OSC_PACKET_SIZE: usize = 1536;

/// Extensions tried, in order, when resolving a logo from local assets
pub const LOGO_ASSET_EXTENSIONS: &[&str] = &["png", "jpg", "gif", "svg"];

/// Set durations on events are expressed in minutes
pub const SET_DURATION_UNIT_MS: u64 = 60_000;
