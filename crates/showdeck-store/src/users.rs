//! CRUD operations for [`User`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use showdeck_shared::types::UserRole;

use crate::database::{not_found, ts_from_sql, ts_to_sql, Database};
use crate::error::Result;
use crate::models::User;

impl Database {
    /// Insert a user or refresh its name, role and last-seen time.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, name, role, last_seen)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 name      = excluded.name,
                 role      = excluded.role,
                 last_seen = excluded.last_seen",
            params![
                user.id,
                user.name,
                user.role.as_str(),
                ts_to_sql(&user.last_seen),
            ],
        )?;
        Ok(())
    }

    /// Bump `last_seen`.  Returns `false` when the user is unknown.
    pub fn touch_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET last_seen = ?1 WHERE id = ?2",
            params![ts_to_sql(&at), id],
        )?;
        Ok(affected > 0)
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, name, role, last_seen FROM users WHERE id = ?1",
                params![id],
                |row| {
                    let role: String = row.get(2)?;
                    let last_seen: String = row.get(3)?;
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        role: UserRole::from(role),
                        last_seen: ts_from_sql(3, &last_seen)?,
                    })
                },
            )
            .map_err(not_found)
    }
}
