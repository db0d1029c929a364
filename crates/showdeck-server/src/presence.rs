//! Who is connected right now.
//!
//! The online set lives in memory only.  Durable identity and `last_seen`
//! are written through to the cache so status survives restarts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use showdeck_shared::protocol::AuthPayload;
use showdeck_shared::types::UserRole;
use showdeck_store::{StoreError, User};

use crate::error::ServerError;
use crate::SharedDb;

/// Opaque id of one transport connection.
pub type ConnectionId = u64;

#[derive(Debug, Clone)]
struct PresenceEntry {
    name: String,
    role: UserRole,
    connection: ConnectionId,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: String,
    pub name: String,
    pub role: UserRole,
    pub connection_id: ConnectionId,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: String,
    pub is_online: bool,
    /// `false` when the user has never connected.
    pub known: bool,
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub last_seen: Option<DateTime<Utc>>,
}

pub struct PresenceRegistry {
    db: SharedDb,
    online: RwLock<HashMap<String, PresenceEntry>>,
}

impl PresenceRegistry {
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            online: RwLock::new(HashMap::new()),
        }
    }

    pub fn new_user_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Register a user as online on `connection`.
    ///
    /// On a storage failure nothing is recorded and the error is returned;
    /// the caller may keep the connection without presence tracking.
    pub async fn connect(
        &self,
        user_id: &str,
        connection: ConnectionId,
        profile: &AuthPayload,
    ) -> Result<(), ServerError> {
        let name = profile.name.trim();
        if name.is_empty() {
            return Err(ServerError::Validation("name must not be empty".into()));
        }

        let now = Utc::now();
        self.db.lock().await.upsert_user(&User {
            id: user_id.to_string(),
            name: name.to_string(),
            role: profile.role.clone(),
            last_seen: now,
        })?;

        self.online.write().await.insert(
            user_id.to_string(),
            PresenceEntry {
                name: name.to_string(),
                role: profile.role.clone(),
                connection,
                last_seen: now,
            },
        );
        debug!(user_id, connection, "User connected");
        Ok(())
    }

    /// Mark a user offline when `connection` closes.
    ///
    /// Returns `false` if the user was not online on that connection, which
    /// covers repeated calls and a session that has since moved elsewhere.
    pub async fn disconnect(&self, user_id: &str, connection: ConnectionId) -> bool {
        {
            let mut online = self.online.write().await;
            let owned = online
                .get(user_id)
                .is_some_and(|entry| entry.connection == connection);
            if !owned {
                return false;
            }
            online.remove(user_id);
        }

        if let Err(e) = self.db.lock().await.touch_user(user_id, Utc::now()) {
            warn!(user_id, error = %e, "Could not persist last_seen");
        }
        debug!(user_id, "User disconnected");
        true
    }

    pub async fn online_users(&self) -> Vec<OnlineUser> {
        let online = self.online.read().await;
        let mut users: Vec<OnlineUser> = online
            .iter()
            .map(|(id, entry)| OnlineUser {
                user_id: id.clone(),
                name: entry.name.clone(),
                role: entry.role.clone(),
                connection_id: entry.connection,
                last_seen: entry.last_seen,
            })
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.user_id.cmp(&b.user_id)));
        users
    }

    pub async fn user_status(&self, user_id: &str) -> Result<UserStatus, ServerError> {
        if let Some(entry) = self.online.read().await.get(user_id) {
            return Ok(UserStatus {
                user_id: user_id.to_string(),
                is_online: true,
                known: true,
                name: Some(entry.name.clone()),
                role: Some(entry.role.clone()),
                last_seen: Some(entry.last_seen),
            });
        }

        match self.db.lock().await.get_user(user_id) {
            Ok(user) => Ok(UserStatus {
                user_id: user.id,
                is_online: false,
                known: true,
                name: Some(user.name),
                role: Some(user.role),
                last_seen: Some(user.last_seen),
            }),
            Err(StoreError::NotFound) => Ok(UserStatus {
                user_id: user_id.to_string(),
                is_online: false,
                known: false,
                name: None,
                role: None,
                last_seen: None,
            }),
            Err(e) => Err(e.into()),
        }
    }
}
