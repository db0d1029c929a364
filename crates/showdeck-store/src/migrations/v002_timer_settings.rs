use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS timer_settings (
    event_id    TEXT PRIMARY KEY NOT NULL,    -- FK -> events(id)
    duration_ms INTEGER NOT NULL,
    warning_ms  INTEGER,
    auto_start  INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    FOREIGN KEY (event_id) REFERENCES events(id)
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
