//! Resolution of a logo id to something the output can show.
//!
//! Sources are tried in order; the first hit wins.  The default chain looks
//! in the cached catalog first, then in a local assets directory holding
//! `<id>.<ext>` files.

use std::path::{Path, PathBuf};

use serde::Serialize;

use showdeck_shared::constants::LOGO_ASSET_EXTENSIONS;
use showdeck_store::StoreError;

use crate::error::ServerError;
use crate::SharedDb;

/// A logo ready to be handed to a [`crate::output::PlaybackOutput`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLogo {
    pub id: String,
    /// Owning event.  `None` for local assets outside the catalog.
    pub event_id: Option<String>,
    pub path: String,
    #[serde(rename = "type")]
    pub logo_type: String,
}

pub enum LogoSource {
    Catalog(SharedDb),
    LocalAssets(PathBuf),
}

impl LogoSource {
    async fn lookup(&self, logo_id: &str) -> Result<Option<ResolvedLogo>, ServerError> {
        match self {
            LogoSource::Catalog(db) => match db.lock().await.get_logo(logo_id) {
                Ok(logo) => Ok(Some(ResolvedLogo {
                    id: logo.id,
                    event_id: Some(logo.event_id),
                    path: logo.path,
                    logo_type: logo.logo_type,
                })),
                Err(StoreError::NotFound) => Ok(None),
                Err(e) => Err(e.into()),
            },
            LogoSource::LocalAssets(dir) => Ok(find_asset(dir, logo_id).await.map(|path| {
                ResolvedLogo {
                    id: logo_id.to_string(),
                    event_id: None,
                    path: path.to_string_lossy().into_owned(),
                    logo_type: "asset".to_string(),
                }
            })),
        }
    }
}

async fn find_asset(dir: &Path, logo_id: &str) -> Option<PathBuf> {
    // Ids name files directly; anything that could leave `dir` is rejected.
    let escapes = |c: char| c == '/' || c == '\\';
    if logo_id.is_empty() || logo_id.starts_with('.') || logo_id.contains(escapes) {
        return None;
    }

    for ext in LOGO_ASSET_EXTENSIONS {
        let candidate = dir.join(format!("{logo_id}.{ext}"));
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Some(candidate);
        }
    }
    None
}

pub struct LogoResolver {
    chain: Vec<LogoSource>,
}

impl LogoResolver {
    pub fn new(chain: Vec<LogoSource>) -> Self {
        Self { chain }
    }

    /// Catalog first, then the local assets directory.
    pub fn standard(db: SharedDb, assets_dir: PathBuf) -> Self {
        Self::new(vec![
            LogoSource::Catalog(db),
            LogoSource::LocalAssets(assets_dir),
        ])
    }

    pub async fn resolve(&self, logo_id: &str) -> Result<Option<ResolvedLogo>, ServerError> {
        for source in &self.chain {
            if let Some(logo) = source.lookup(logo_id).await? {
                return Ok(Some(logo));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{remote_event, temp_db};

    #[tokio::test]
    async fn catalog_wins_over_assets() {
        let (_dir, db) = temp_db();
        let assets = tempfile::tempdir().unwrap();
        std::fs::write(assets.path().join("l1.png"), b"png").unwrap();
        std::fs::write(assets.path().join("local.svg"), b"svg").unwrap();

        let entry = remote_event("e1", 20, &["l1"]).into_catalog_entry(chrono::Utc::now());
        db.lock().await.reconcile_catalog(&[entry]).unwrap();

        let resolver = LogoResolver::standard(db, assets.path().to_path_buf());

        let l1 = resolver.resolve("l1").await.unwrap().unwrap();
        assert_eq!(l1.event_id.as_deref(), Some("e1"));
        assert_eq!(l1.path, "/logos/l1.png");

        let local = resolver.resolve("local").await.unwrap().unwrap();
        assert_eq!(local.event_id, None);
        assert!(local.path.ends_with("local.svg"));

        assert!(resolver.resolve("missing").await.unwrap().is_none());
        assert!(resolver.resolve("../l1").await.unwrap().is_none());
    }
}
