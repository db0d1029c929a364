//! CRUD operations for [`Event`] records and the catalog reconciliation pass.

use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{not_found, ts_from_sql, ts_to_sql, Database};
use crate::error::Result;
use crate::logos::upsert_logo_on;
use crate::models::{CatalogEntry, Event, EventWithLogos, ReconcileStats};

const EVENT_COLUMNS: &str =
    "e.id, e.title, e.start_time, e.end_time, e.artist_name, e.set_duration, e.last_updated";

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert or overwrite a single event, keyed by id.
    pub fn upsert_event(&self, event: &Event) -> Result<()> {
        upsert_event_on(self.conn(), event)
    }

    /// Upsert every event of a remote pull together with its logos.
    ///
    /// Runs in one transaction: either every row lands or none does.  Nothing
    /// is deleted, rows absent from `entries` are left untouched.
    pub fn reconcile_catalog(&mut self, entries: &[CatalogEntry]) -> Result<ReconcileStats> {
        let tx = self.conn_mut().transaction()?;
        let mut stats = ReconcileStats::default();

        for entry in entries {
            upsert_event_on(&tx, &entry.event)?;
            stats.events += 1;

            for logo in &entry.logos {
                upsert_logo_on(&tx, logo)?;
                stats.logos += 1;
            }
        }

        tx.commit()?;

        tracing::debug!(
            events = stats.events,
            logos = stats.logos,
            "catalog reconciled"
        );
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single event with its logo ids.
    pub fn get_event(&self, id: &str) -> Result<EventWithLogos> {
        let event = self
            .conn()
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = ?1"),
                params![id],
                row_to_event,
            )
            .map_err(not_found)?;

        let mut stmt = self
            .conn()
            .prepare("SELECT id FROM logos WHERE event_id = ?1 ORDER BY id ASC")?;
        let logo_ids = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(EventWithLogos { event, logo_ids })
    }

    /// List all events ordered by start time, each with its logo ids.
    pub fn list_events(&self) -> Result<Vec<EventWithLogos>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {EVENT_COLUMNS}, l.id
             FROM events e
             LEFT JOIN logos l ON l.event_id = e.id
             ORDER BY e.start_time ASC, e.id ASC, l.id ASC"
        ))?;

        let rows = stmt.query_map([], |row| {
            let event = row_to_event(row)?;
            let logo_id: Option<String> = row.get(7)?;
            Ok((event, logo_id))
        })?;

        let mut events: Vec<EventWithLogos> = Vec::new();
        for row in rows {
            let (event, logo_id) = row?;
            match events.last_mut() {
                Some(last) if last.event.id == event.id => {
                    last.logo_ids.extend(logo_id);
                }
                _ => events.push(EventWithLogos {
                    event,
                    logo_ids: logo_id.into_iter().collect(),
                }),
            }
        }
        Ok(events)
    }

    pub fn event_exists(&self, id: &str) -> Result<bool> {
        event_exists_on(self.conn(), id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn upsert_event_on(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (id, title, start_time, end_time, artist_name, set_duration, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             title        = excluded.title,
             start_time   = excluded.start_time,
             end_time     = excluded.end_time,
             artist_name  = excluded.artist_name,
             set_duration = excluded.set_duration,
             last_updated = excluded.last_updated",
        params![
            event.id,
            event.title,
            ts_to_sql(&event.start_time),
            ts_to_sql(&event.end_time),
            event.artist_name,
            event.set_duration,
            ts_to_sql(&event.last_updated),
        ],
    )?;
    Ok(())
}

pub(crate) fn event_exists_on(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM events WHERE id = ?1", params![id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Map the first seven columns of a row to an [`Event`].
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let start: String = row.get(2)?;
    let end: String = row.get(3)?;
    let updated: String = row.get(6)?;

    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        start_time: ts_from_sql(2, &start)?,
        end_time: ts_from_sql(3, &end)?,
        artist_name: row.get(4)?,
        set_duration: row.get(5)?,
        last_updated: ts_from_sql(6, &updated)?,
    })
}
