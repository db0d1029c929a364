//! Two-party conversations between surface users.
//!
//! Messages are persisted before they are acknowledged.  Recent histories are
//! kept in a bounded in-memory cache holding whole conversations: a history
//! is either fully loaded or absent, never partial.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use showdeck_store::{Conversation, ConversationSummary, Message};

use crate::error::{ServerError, StoreResultExt};
use crate::SharedDb;

/// Acknowledgment of a read message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: String,
    pub conversation_id: String,
    pub read_at: DateTime<Utc>,
    /// `false` when the message had already been read.
    pub first_read: bool,
}

type History = Arc<Mutex<Option<Vec<Message>>>>;

struct CacheSlot {
    history: History,
    last_used: u64,
}

/// Per-conversation slots with least-recently-used eviction.
///
/// A slot's mutex also serialises writes to its conversation.  Slots that are
/// currently held by a caller are never evicted.
struct HistoryCache {
    slots: HashMap<String, CacheSlot>,
    capacity: usize,
    clock: u64,
}

impl HistoryCache {
    fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    fn slot(&mut self, conversation_id: &str) -> History {
        self.clock += 1;
        let now = self.clock;
        let history = match self.slots.get_mut(conversation_id) {
            Some(slot) => {
                slot.last_used = now;
                slot.history.clone()
            }
            None => {
                let history: History = Arc::new(Mutex::new(None));
                self.slots.insert(
                    conversation_id.to_string(),
                    CacheSlot {
                        history: history.clone(),
                        last_used: now,
                    },
                );
                history
            }
        };
        self.evict();
        history
    }

    fn evict(&mut self) {
        while self.slots.len() > self.capacity {
            let victim = self
                .slots
                .iter()
                .filter(|(_, slot)| Arc::strong_count(&slot.history) == 1)
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());
            match victim {
                Some(id) => {
                    self.slots.remove(&id);
                    debug!(conversation_id = %id, "History evicted");
                }
                None => break,
            }
        }
    }
}

pub struct Messaging {
    db: SharedDb,
    cache: Mutex<HistoryCache>,
}

impl Messaging {
    pub fn new(db: SharedDb, cached_conversations: usize) -> Self {
        Self {
            db,
            cache: Mutex::new(HistoryCache::new(cached_conversations)),
        }
    }

    /// Cache slot of an existing conversation.  Unknown ids never take a slot.
    async fn slot(&self, conversation_id: &str) -> Result<History, ServerError> {
        self.db
            .lock()
            .await
            .get_conversation(conversation_id)
            .or_not_found("Conversation", conversation_id)?;
        Ok(self.cache.lock().await.slot(conversation_id))
    }

    pub async fn create_conversation(
        &self,
        participant_a: &str,
        participant_b: &str,
    ) -> Result<Conversation, ServerError> {
        if participant_a == participant_b {
            return Err(ServerError::Validation(
                "a conversation needs two distinct participants".into(),
            ));
        }

        let db = self.db.lock().await;
        for user_id in [participant_a, participant_b] {
            db.get_user(user_id).or_not_found("User", user_id)?;
        }

        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            participant_a: participant_a.to_string(),
            participant_b: participant_b.to_string(),
            created_at: Utc::now(),
        };
        db.create_conversation(&conversation)?;
        info!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    pub async fn conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ServerError> {
        let db = self.db.lock().await;
        db.get_user(user_id).or_not_found("User", user_id)?;
        Ok(db.list_conversations_for_user(user_id)?)
    }

    /// Persist and return a new message.
    ///
    /// `sent_at` never goes backwards within a conversation, so history order
    /// matches acceptance order even if the wall clock steps back.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message, ServerError> {
        if content.trim().is_empty() {
            return Err(ServerError::Validation("message content must not be empty".into()));
        }

        let slot = self.slot(conversation_id).await?;
        let mut history = slot.lock().await;

        let message = {
            let db = self.db.lock().await;
            let conversation = db
                .get_conversation(conversation_id)
                .or_not_found("Conversation", conversation_id)?;
            if sender_id != conversation.participant_a && sender_id != conversation.participant_b {
                return Err(ServerError::Validation(format!(
                    "user {sender_id} is not a participant of {conversation_id}"
                )));
            }

            let mut sent_at = Utc::now();
            if let Some(last) = db.latest_sent_at(conversation_id)? {
                sent_at = sent_at.max(last);
            }

            let message = Message {
                id: Uuid::new_v4().to_string(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.to_string(),
                content: content.to_string(),
                sent_at,
                read_at: None,
            };
            db.insert_message(&message)?;
            message
        };

        if let Some(messages) = history.as_mut() {
            messages.push(message.clone());
        }
        debug!(message_id = %message.id, conversation_id, "Message sent");
        Ok(message)
    }

    /// Full history of a conversation in send order.
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<Message>, ServerError> {
        let slot = self.slot(conversation_id).await?;
        let mut history = slot.lock().await;
        if let Some(messages) = history.as_ref() {
            return Ok(messages.clone());
        }

        let loaded = self
            .db
            .lock()
            .await
            .get_messages_for_conversation(conversation_id)?;
        *history = Some(loaded.clone());
        Ok(loaded)
    }

    /// Record that a message was read.  Repeated calls keep the first time.
    pub async fn mark_read(
        &self,
        message_id: &str,
        conversation_id: &str,
    ) -> Result<ReadReceipt, ServerError> {
        let slot = self.slot(conversation_id).await?;
        let mut history = slot.lock().await;

        let (message, first_read) = {
            let db = self.db.lock().await;
            let message = db.get_message(message_id).or_not_found("Message", message_id)?;
            if message.conversation_id != conversation_id {
                return Err(ServerError::not_found("Message", message_id));
            }
            let first_read = db.mark_message_read(message_id, Utc::now())?;
            (db.get_message(message_id)?, first_read)
        };

        let read_at = message.read_at.ok_or_else(|| {
            ServerError::Internal(format!("message {message_id} has no read time after marking"))
        })?;

        if let Some(messages) = history.as_mut() {
            if let Some(cached) = messages.iter_mut().find(|m| m.id == message_id) {
                cached.read_at = Some(read_at);
            }
        }

        Ok(ReadReceipt {
            message_id: message.id,
            conversation_id: message.conversation_id,
            read_at,
            first_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_db;
    use showdeck_shared::types::UserRole;
    use showdeck_store::User;

    async fn seeded(capacity: usize) -> (tempfile::TempDir, SharedDb, Messaging, Conversation) {
        let (dir, db) = temp_db();
        {
            let guard = db.lock().await;
            for (id, name, role) in [("dj", "Dee", UserRole::Dj), ("vj", "Vee", UserRole::Vj)] {
                guard
                    .upsert_user(&User {
                        id: id.into(),
                        name: name.into(),
                        role,
                        last_seen: Utc::now(),
                    })
                    .unwrap();
            }
        }
        let messaging = Messaging::new(db.clone(), capacity);
        let conversation = messaging.create_conversation("dj", "vj").await.unwrap();
        (dir, db, messaging, conversation)
    }

    #[tokio::test]
    async fn history_preserves_send_order() {
        let (_dir, _db, messaging, c) = seeded(4).await;
        let m1 = messaging.send_message(&c.id, "dj", "first").await.unwrap();
        // Load the cache between sends so both paths are exercised.
        assert_eq!(messaging.history(&c.id).await.unwrap(), vec![m1.clone()]);
        let m2 = messaging.send_message(&c.id, "vj", "second").await.unwrap();

        let history = messaging.history(&c.id).await.unwrap();
        assert_eq!(history, vec![m1.clone(), m2.clone()]);
        assert!(m1.sent_at <= m2.sent_at);
    }

    #[tokio::test]
    async fn history_survives_eviction() {
        let (_dir, db, messaging, c) = seeded(1).await;
        messaging.send_message(&c.id, "dj", "hello").await.unwrap();
        messaging.history(&c.id).await.unwrap();

        // A second conversation pushes the first out of a one-slot cache.
        let other = {
            let conversation = Conversation {
                id: "c2".into(),
                participant_a: "vj".into(),
                participant_b: "dj".into(),
                created_at: Utc::now(),
            };
            db.lock().await.create_conversation(&conversation).unwrap();
            conversation
        };
        messaging.history(&other.id).await.unwrap();
        assert_eq!(messaging.cache.lock().await.slots.len(), 1);

        let history = messaging.history(&c.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello");
    }

    #[tokio::test]
    async fn unknown_conversations_never_take_a_cache_slot() {
        let (_dir, _db, messaging, c) = seeded(1).await;
        messaging.send_message(&c.id, "dj", "hello").await.unwrap();
        messaging.history(&c.id).await.unwrap();

        for bogus in ["nope-1", "nope-2"] {
            assert!(matches!(
                messaging.history(bogus).await,
                Err(ServerError::NotFound { kind: "Conversation", .. })
            ));
            assert!(messaging.mark_read("m", bogus).await.is_err());
            assert!(messaging.send_message(bogus, "dj", "hi").await.is_err());
        }

        let cache = messaging.cache.lock().await;
        assert_eq!(cache.slots.len(), 1);
        let slot = cache.slots.get(&c.id).unwrap();
        assert!(slot.history.try_lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let (_dir, _db, messaging, c) = seeded(4).await;
        let m = messaging.send_message(&c.id, "dj", "ping").await.unwrap();

        let first = messaging.mark_read(&m.id, &c.id).await.unwrap();
        assert!(first.first_read);
        let second = messaging.mark_read(&m.id, &c.id).await.unwrap();
        assert!(!second.first_read);
        assert_eq!(first.read_at, second.read_at);

        let history = messaging.history(&c.id).await.unwrap();
        assert_eq!(history[0].read_at, Some(first.read_at));
    }

    #[tokio::test]
    async fn mark_read_checks_conversation() {
        let (_dir, db, messaging, c) = seeded(4).await;
        let m = messaging.send_message(&c.id, "dj", "ping").await.unwrap();
        db.lock()
            .await
            .create_conversation(&Conversation {
                id: "c2".into(),
                participant_a: "vj".into(),
                participant_b: "dj".into(),
                created_at: Utc::now(),
            })
            .unwrap();
        assert!(matches!(
            messaging.mark_read(&m.id, "c2").await,
            Err(ServerError::NotFound { kind: "Message", .. })
        ));
        assert!(matches!(
            messaging.mark_read(&m.id, "other").await,
            Err(ServerError::NotFound { kind: "Conversation", .. })
        ));
        assert!(matches!(
            messaging.mark_read("missing", &c.id).await,
            Err(ServerError::NotFound { kind: "Message", .. })
        ));
    }

    #[tokio::test]
    async fn send_requires_existing_conversation_and_participant() {
        let (_dir, _db, messaging, c) = seeded(4).await;
        assert!(matches!(
            messaging.send_message("nope", "dj", "hi").await,
            Err(ServerError::NotFound { kind: "Conversation", .. })
        ));
        assert!(matches!(
            messaging.send_message(&c.id, "stranger", "hi").await,
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            messaging.send_message(&c.id, "dj", "   ").await,
            Err(ServerError::Validation(_))
        ));
        assert!(messaging.history(&c.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_conversation_validates_participants() {
        let (_dir, _db, messaging, _c) = seeded(4).await;
        assert!(matches!(
            messaging.create_conversation("dj", "dj").await,
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            messaging.create_conversation("dj", "ghost").await,
            Err(ServerError::NotFound { kind: "User", .. })
        ));

        let listed = messaging.conversations_for_user("vj").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].other_user_name, "Dee");
    }
}
