//! Per-event countdown settings.

use rusqlite::{params, OptionalExtension};

use showdeck_shared::types::TimerSettings;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    pub fn get_timer_settings(&self, event_id: &str) -> Result<Option<TimerSettings>> {
        let settings = self
            .conn()
            .query_row(
                "SELECT duration_ms, warning_ms, auto_start FROM timer_settings WHERE event_id = ?1",
                params![event_id],
                |row| {
                    let warning_ms: Option<i64> = row.get(1)?;
                    Ok(TimerSettings {
                        duration_ms: row.get(0)?,
                        warning_ms: warning_ms.map(|w| w.max(0) as u64),
                        auto_start: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    /// Store settings for an event.  Fails with [`StoreError::NotFound`] when
    /// the event is not cached.
    pub fn put_timer_settings(&self, event_id: &str, settings: &TimerSettings) -> Result<()> {
        if !self.event_exists(event_id)? {
            return Err(StoreError::NotFound);
        }

        self.conn().execute(
            "INSERT INTO timer_settings (event_id, duration_ms, warning_ms, auto_start)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(event_id) DO UPDATE SET
                 duration_ms = excluded.duration_ms,
                 warning_ms  = excluded.warning_ms,
                 auto_start  = excluded.auto_start",
            params![
                event_id,
                settings.duration_ms,
                settings.warning_ms.map(|w| w as i64),
                settings.auto_start,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_db;
    use crate::events::tests::event;

    #[test]
    fn settings_round_trip() {
        let (_dir, db) = test_db();
        db.upsert_event(&event("e1", 20)).unwrap();
        assert_eq!(db.get_timer_settings("e1").unwrap(), None);

        let settings = TimerSettings {
            duration_ms: 45 * 60_000,
            warning_ms: Some(60_000),
            auto_start: true,
        };
        db.put_timer_settings("e1", &settings).unwrap();
        assert_eq!(db.get_timer_settings("e1").unwrap(), Some(settings));
    }

    #[test]
    fn settings_require_cached_event() {
        let (_dir, db) = test_db();
        let settings = TimerSettings {
            duration_ms: 1000,
            warning_ms: None,
            auto_start: false,
        };
        assert!(matches!(
            db.put_timer_settings("ghost", &settings),
            Err(StoreError::NotFound)
        ));
    }
}
