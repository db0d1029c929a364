//! Domain model structs persisted in the local cache.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the REST and WebSocket layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use showdeck_shared::types::UserRole;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A scheduled show slot mirrored from the remote catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Stable key assigned by the remote catalog.
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub artist_name: Option<String>,
    /// Length of the set in minutes.
    pub set_duration: Option<i64>,
    /// When this row was last written by a reconciliation or an update.
    pub last_updated: DateTime<Utc>,
}

/// An event together with the ids of the logos attached to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventWithLogos {
    #[serde(flatten)]
    pub event: Event,
    pub logo_ids: Vec<String>,
}

/// One event of a remote pull, with its nested logos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub event: Event,
    pub logos: Vec<Logo>,
}

/// Row counts written by a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileStats {
    pub events: usize,
    pub logos: usize,
}

// ---------------------------------------------------------------------------
// Logo
// ---------------------------------------------------------------------------

/// A visual asset shown on air for an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Logo {
    pub id: String,
    /// Owning event; must exist when the logo is written.
    pub event_id: String,
    /// Content locator (file path or URL).
    pub path: String,
    #[serde(rename = "type")]
    pub logo_type: String,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A control-surface user, created the first time it connects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A two-party conversation.  Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: DateTime<Utc>,
}

/// A conversation as listed for one of its participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub other_user_name: String,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    /// Set by the first read acknowledgment, never cleared.
    pub read_at: Option<DateTime<Utc>>,
}
