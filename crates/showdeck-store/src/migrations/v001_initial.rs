//! v001 -- Initial schema creation.
//!
//! Creates the catalog tables (`events`, `logos`) and the messaging tables
//! (`users`, `conversations`, `messages`).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Events (mirrored from the remote catalog)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS events (
    id           TEXT PRIMARY KEY NOT NULL,   -- remote catalog key
    title        TEXT NOT NULL,
    start_time   TEXT NOT NULL,               -- RFC-3339, UTC
    end_time     TEXT NOT NULL,
    artist_name  TEXT,
    set_duration INTEGER,                     -- minutes
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_start_time ON events(start_time);

-- ----------------------------------------------------------------
-- Logos
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS logos (
    id       TEXT PRIMARY KEY NOT NULL,
    event_id TEXT NOT NULL,                   -- FK -> events(id)
    path     TEXT NOT NULL,                   -- content locator
    type     TEXT NOT NULL,

    FOREIGN KEY (event_id) REFERENCES events(id)
);

CREATE INDEX IF NOT EXISTS idx_logos_event_id ON logos(event_id);

-- ----------------------------------------------------------------
-- Users (assigned at connection time)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id        TEXT PRIMARY KEY NOT NULL,      -- UUID v4
    name      TEXT NOT NULL,
    role      TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    participant_a TEXT NOT NULL,              -- FK -> users(id)
    participant_b TEXT NOT NULL,              -- FK -> users(id)
    created_at    TEXT NOT NULL,

    FOREIGN KEY (participant_a) REFERENCES users(id),
    FOREIGN KEY (participant_b) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_conversations_a ON conversations(participant_a);
CREATE INDEX IF NOT EXISTS idx_conversations_b ON conversations(participant_b);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,              -- FK -> users(id)
    content         TEXT NOT NULL,
    sent_at         TEXT NOT NULL,
    read_at         TEXT,                       -- set once, never cleared

    FOREIGN KEY (conversation_id) REFERENCES conversations(id),
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_sent
    ON messages(conversation_id, sent_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
