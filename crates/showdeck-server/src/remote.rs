//! Client for the authoritative remote event catalog.
//!
//! The catalog speaks JSON over HTTP: `GET {base}/events` returns every
//! event with its logos nested, `PUT {base}/events/{id}` accepts an edited
//! event and echoes the stored version back.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use showdeck_store::{CatalogEntry, Event, Logo};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog answered with status {0}")]
    Status(u16),
}

impl From<RemoteError> for ServerError {
    fn from(e: RemoteError) -> Self {
        ServerError::RemoteUnavailable(e.to_string())
    }
}

/// Event as exchanged with the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub set_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logos: Vec<RemoteLogo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLogo {
    pub id: String,
    pub path: String,
    #[serde(rename = "type", default = "default_logo_type")]
    pub logo_type: String,
}

fn default_logo_type() -> String {
    "default".to_string()
}

impl RemoteEvent {
    /// Convert to the cache representation, stamping `last_updated`.
    pub fn into_catalog_entry(self, synced_at: DateTime<Utc>) -> CatalogEntry {
        let logos = self
            .logos
            .into_iter()
            .map(|l| Logo {
                id: l.id,
                event_id: self.id.clone(),
                path: l.path,
                logo_type: l.logo_type,
            })
            .collect();

        CatalogEntry {
            event: Event {
                id: self.id,
                title: self.title,
                start_time: self.start_time,
                end_time: self.end_time,
                artist_name: self.artist_name,
                set_duration: self.set_duration,
                last_updated: synced_at,
            },
            logos,
        }
    }
}

impl From<&Event> for RemoteEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            artist_name: event.artist_name.clone(),
            set_duration: event.set_duration,
            logos: Vec::new(),
        }
    }
}

/// Source of truth for events and logos.
pub trait RemoteCatalog: Send + Sync {
    fn fetch_events(&self) -> BoxFuture<'_, Result<Vec<RemoteEvent>, RemoteError>>;

    fn push_event<'a>(
        &'a self,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, Result<RemoteEvent, RemoteError>>;
}

pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCatalog {
    pub fn new(config: &ServerConfig) -> Result<Self, RemoteError> {
        Self::with_timeout(
            config.remote_api_url.clone(),
            config.remote_api_key.clone(),
            config.remote_timeout,
        )
    }

    pub fn with_timeout(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("showdeck/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

impl RemoteCatalog for HttpCatalog {
    fn fetch_events(&self) -> BoxFuture<'_, Result<Vec<RemoteEvent>, RemoteError>> {
        Box::pin(async move {
            let url = format!("{}/events", self.base_url);
            let resp = self.authorize(self.client.get(&url)).send().await?;
            if !resp.status().is_success() {
                return Err(RemoteError::Status(resp.status().as_u16()));
            }
            Ok(resp.json().await?)
        })
    }

    fn push_event<'a>(
        &'a self,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, Result<RemoteEvent, RemoteError>> {
        Box::pin(async move {
            let url = format!("{}/events/{}", self.base_url, event.id);
            let resp = self
                .authorize(self.client.put(&url))
                .json(event)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(RemoteError::Status(resp.status().as_u16()));
            }
            Ok(resp.json().await?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_payload_decodes_with_defaults() {
        let json = r#"[{
            "id": "e1",
            "title": "Opening",
            "start_time": "2024-06-01T20:00:00Z",
            "end_time": "2024-06-01T21:00:00Z",
            "logos": [{"id": "l1", "path": "/l1.png"}]
        }]"#;
        let events: Vec<RemoteEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(events[0].artist_name, None);
        assert_eq!(events[0].logos[0].logo_type, "default");

        let now = Utc::now();
        let entry = events[0].clone().into_catalog_entry(now);
        assert_eq!(entry.event.last_updated, now);
        assert_eq!(entry.logos[0].event_id, "e1");
    }
}
