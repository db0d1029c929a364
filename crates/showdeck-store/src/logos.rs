//! CRUD operations for [`Logo`] records.

use rusqlite::{params, Connection};

use crate::database::{not_found, Database};
use crate::error::{Result, StoreError};
use crate::events::event_exists_on;
use crate::models::Logo;

impl Database {
    /// Insert or overwrite a logo.  The owning event must already be cached.
    pub fn upsert_logo(&self, logo: &Logo) -> Result<()> {
        upsert_logo_on(self.conn(), logo)
    }

    pub fn get_logo(&self, id: &str) -> Result<Logo> {
        self.conn()
            .query_row(
                "SELECT id, event_id, path, type FROM logos WHERE id = ?1",
                params![id],
                row_to_logo,
            )
            .map_err(not_found)
    }

    /// All logos attached to an event, ordered by id.
    pub fn list_logos_for_event(&self, event_id: &str) -> Result<Vec<Logo>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, event_id, path, type FROM logos WHERE event_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![event_id], row_to_logo)?;

        let mut logos = Vec::new();
        for row in rows {
            logos.push(row?);
        }
        Ok(logos)
    }

    pub fn list_logos(&self) -> Result<Vec<Logo>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, event_id, path, type FROM logos ORDER BY event_id ASC, id ASC")?;
        let rows = stmt.query_map([], row_to_logo)?;

        let mut logos = Vec::new();
        for row in rows {
            logos.push(row?);
        }
        Ok(logos)
    }

    /// Delete a logo by id.  Returns `true` if a row was deleted.
    pub fn delete_logo(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM logos WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

pub(crate) fn upsert_logo_on(conn: &Connection, logo: &Logo) -> Result<()> {
    if !event_exists_on(conn, &logo.event_id)? {
        return Err(StoreError::OrphanLogo {
            logo_id: logo.id.clone(),
            event_id: logo.event_id.clone(),
        });
    }

    conn.execute(
        "INSERT INTO logos (id, event_id, path, type)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             event_id = excluded.event_id,
             path     = excluded.path,
             type     = excluded.type",
        params![logo.id, logo.event_id, logo.path, logo.logo_type],
    )?;
    Ok(())
}

fn row_to_logo(row: &rusqlite::Row<'_>) -> rusqlite::Result<Logo> {
    Ok(Logo {
        id: row.get(0)?,
        event_id: row.get(1)?,
        path: row.get(2)?,
        logo_type: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_db;
    use crate::events::tests::{event, logo};

    #[test]
    fn orphan_logo_is_rejected() {
        let (_dir, db) = test_db();
        let err = db.upsert_logo(&logo("l1", "ghost")).unwrap_err();
        assert!(matches!(err, StoreError::OrphanLogo { ref event_id, .. } if event_id == "ghost"));
        assert!(db.list_logos().unwrap().is_empty());
    }

    #[test]
    fn logo_crud() {
        let (_dir, db) = test_db();
        db.upsert_event(&event("e1", 20)).unwrap();
        db.upsert_logo(&logo("l1", "e1")).unwrap();
        db.upsert_logo(&logo("l2", "e1")).unwrap();

        assert_eq!(db.get_logo("l1").unwrap().path, "/logos/l1.png");
        assert_eq!(db.list_logos_for_event("e1").unwrap().len(), 2);

        assert!(db.delete_logo("l1").unwrap());
        assert!(!db.delete_logo("l1").unwrap());
        assert!(matches!(db.get_logo("l1"), Err(StoreError::NotFound)));
    }
}
