use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::{not_found, ts_from_sql, ts_to_sql, Database};
use crate::error::Result;
use crate::models::Message;

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, sent_at, read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.conversation_id,
                message.sender_id,
                message.content,
                ts_to_sql(&message.sent_at),
                message.read_at.as_ref().map(ts_to_sql),
            ],
        )?;
        Ok(())
    }

    /// Full history of a conversation in send order.
    pub fn get_messages_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, sender_id, content, sent_at, read_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY sent_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: &str) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, conversation_id, sender_id, content, sent_at, read_at
                 FROM messages WHERE id = ?1",
                params![id],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// Set `read_at` if it is still empty.  Returns `true` when this call set it.
    pub fn mark_message_read(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
            params![ts_to_sql(&at), id],
        )?;
        Ok(affected > 0)
    }

    /// Send time of the newest message in a conversation.
    pub fn latest_sent_at(&self, conversation_id: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT MAX(sent_at) FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        match raw {
            Some(s) => Ok(Some(DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc))),
            None => Ok(None),
        }
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let sent: String = row.get(4)?;
    let read: Option<String> = row.get(5)?;

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        sent_at: ts_from_sql(4, &sent)?,
        read_at: read.map(|r| ts_from_sql(5, &r)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::tests::seed_pair;
    use crate::database::test_db;
    use crate::error::StoreError;

    fn message(id: &str, sent_at: DateTime<Utc>) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".into(),
            sender_id: "dj".into(),
            content: format!("hello {id}"),
            sent_at,
            read_at: None,
        }
    }

    #[test]
    fn history_in_send_order_with_equal_timestamps() {
        let (_dir, db) = test_db();
        seed_pair(&db);
        let now = Utc::now();

        db.insert_message(&message("m2", now)).unwrap();
        db.insert_message(&message("m1", now)).unwrap();
        db.insert_message(&message("m3", now + chrono::Duration::milliseconds(1)))
            .unwrap();

        let ids: Vec<_> = db
            .get_messages_for_conversation("c1")
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m2", "m1", "m3"]);
        assert_eq!(
            db.latest_sent_at("c1").unwrap(),
            Some(now + chrono::Duration::milliseconds(1))
        );
    }

    #[test]
    fn mark_read_sets_once() {
        let (_dir, db) = test_db();
        seed_pair(&db);
        db.insert_message(&message("m1", Utc::now())).unwrap();

        let first = Utc::now();
        assert!(db.mark_message_read("m1", first).unwrap());
        assert!(!db
            .mark_message_read("m1", first + chrono::Duration::seconds(5))
            .unwrap());
        assert_eq!(db.get_message("m1").unwrap().read_at, Some(first));
    }

    #[test]
    fn empty_conversation_has_no_latest() {
        let (_dir, db) = test_db();
        seed_pair(&db);
        assert_eq!(db.latest_sent_at("c1").unwrap(), None);
        assert!(matches!(db.get_message("zz"), Err(StoreError::NotFound)));
    }

    #[test]
    fn latest_with_corrupt_timestamp_is_a_parse_error() {
        let (_dir, db) = test_db();
        seed_pair(&db);
        db.conn()
            .execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, sent_at)
                 VALUES ('bad', 'c1', 'dj', 'x', 'yesterday-ish')",
                [],
            )
            .unwrap();

        assert!(matches!(
            db.latest_sent_at("c1"),
            Err(StoreError::ChronoParse(_))
        ));
    }
}
