//! CRUD operations for [`Conversation`] records.

use rusqlite::params;

use crate::database::{not_found, ts_from_sql, ts_to_sql, Database};
use crate::error::Result;
use crate::models::{Conversation, ConversationSummary};

impl Database {
    pub fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conn().execute(
            "INSERT INTO conversations (id, participant_a, participant_b, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.id,
                conversation.participant_a,
                conversation.participant_b,
                ts_to_sql(&conversation.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_conversation(&self, id: &str) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, participant_a, participant_b, created_at
                 FROM conversations WHERE id = ?1",
                params![id],
                row_to_conversation,
            )
            .map_err(not_found)
    }

    /// Conversations a user takes part in, newest first, with the other
    /// participant's name.
    pub fn list_conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.participant_a, c.participant_b, c.created_at,
                    CASE WHEN c.participant_a = ?1 THEN ub.name ELSE ua.name END
             FROM conversations c
             JOIN users ua ON c.participant_a = ua.id
             JOIN users ub ON c.participant_b = ub.id
             WHERE c.participant_a = ?1 OR c.participant_b = ?1
             ORDER BY c.created_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ConversationSummary {
                conversation: row_to_conversation(row)?,
                other_user_name: row.get(4)?,
            })
        })?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let created: String = row.get(3)?;
    Ok(Conversation {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        created_at: ts_from_sql(3, &created)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;
    use showdeck_shared::types::UserRole;

    use super::*;
    use crate::database::test_db;
    use crate::error::StoreError;
    use crate::users::tests::user;

    pub(crate) fn seed_pair(db: &Database) -> Conversation {
        db.upsert_user(&user("dj", "Dee", UserRole::Dj)).unwrap();
        db.upsert_user(&user("vj", "Vee", UserRole::Vj)).unwrap();
        let conversation = Conversation {
            id: "c1".into(),
            participant_a: "dj".into(),
            participant_b: "vj".into(),
            created_at: Utc::now(),
        };
        db.create_conversation(&conversation).unwrap();
        conversation
    }

    #[test]
    fn create_and_list_for_each_side() {
        let (_dir, db) = test_db();
        let conversation = seed_pair(&db);
        assert_eq!(db.get_conversation("c1").unwrap(), conversation);

        let for_dj = db.list_conversations_for_user("dj").unwrap();
        assert_eq!(for_dj.len(), 1);
        assert_eq!(for_dj[0].other_user_name, "Vee");

        let for_vj = db.list_conversations_for_user("vj").unwrap();
        assert_eq!(for_vj[0].other_user_name, "Dee");
    }

    #[test]
    fn unknown_participant_violates_foreign_key() {
        let (_dir, db) = test_db();
        let err = db
            .create_conversation(&Conversation {
                id: "c2".into(),
                participant_a: "nobody".into(),
                participant_b: "else".into(),
                created_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }
}
