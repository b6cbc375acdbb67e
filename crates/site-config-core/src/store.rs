//! Sled-backed durable fallback store for the site configuration.
//!
//! The portal keeps a best-effort local copy of the last configuration it
//! successfully fetched so reads survive remote outages and process
//! restarts.  The store holds a single logical key; concurrent writers are
//! not synchronised (last write wins), which is acceptable because the data
//! is always recoverable from the source of truth.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sled::{Config as SledConfig, Db, Tree};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;

/// Tree name dedicated to store metadata records.
const META_TREE: &str = "__meta";
/// Key for the JSON-encoded [`StoreMetadata`] record.
const META_KEY: &[u8] = b"meta.json";
/// Name of the tree storing configuration payloads.
const CONFIG_TREE: &str = "site_config";

/// Metadata persisted alongside the embedded database.
///
/// The record ties the cached payload to the application version and portal
/// backend it was written for; a mismatch on open wipes the cached copy so a
/// redeploy never serves configuration from a different backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreMetadata {
    /// Application version that created the store.
    pub app_version: String,
    /// Remote backend URL the cached payload belongs to.
    pub portal_url: String,
    /// RFC3339 timestamp when the store was created.
    pub creation_time: OffsetDateTime,
}

/// Errors emitted by the [`FallbackStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("payload is not valid UTF-8")]
    InvalidPayload,
}

/// Wrapper around a sled database scoped to the single configuration key.
#[derive(Debug, Clone)]
pub struct FallbackStore {
    db: Db,
    path: PathBuf,
}

impl FallbackStore {
    /// Opens (or creates) a fallback store at the provided path.
    ///
    /// When an existing store carries metadata for a different application
    /// version or backend URL, the cached payload is discarded and the
    /// metadata rewritten; stale configuration from another deployment must
    /// never be served as a fallback.
    pub fn open(
        path: impl AsRef<Path>,
        app_version: &str,
        portal_url: &str,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = SledConfig::new().path(&path).open()?;
        let store = Self { db, path };
        store.validate_metadata(app_version, portal_url)?;
        Ok(store)
    }

    /// Opens an ephemeral in-memory store (tests and diagnostics).
    pub fn ephemeral(app_version: &str, portal_url: &str) -> Result<Self, StoreError> {
        let db = SledConfig::new().temporary(true).open()?;
        let store = Self {
            db,
            path: PathBuf::new(),
        };
        store.validate_metadata(app_version, portal_url)?;
        Ok(store)
    }

    /// Returns the filesystem path backing the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored configuration payload for the given key.
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let tree = self.config_tree()?;
        match tree.get(key.as_bytes())? {
            Some(bytes) => {
                let text =
                    String::from_utf8(bytes.to_vec()).map_err(|_| StoreError::InvalidPayload)?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    /// Stores (or overwrites) the configuration payload for the given key.
    pub fn set(&self, key: &str, payload: &str) -> Result<(), StoreError> {
        let tree = self.config_tree()?;
        tree.insert(key.as_bytes(), payload.as_bytes())?;
        Ok(())
    }

    /// Removes the payload stored under the given key.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let tree = self.config_tree()?;
        tree.remove(key.as_bytes())?;
        Ok(())
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Returns the metadata record currently associated with the store.
    pub fn metadata(&self) -> Result<Option<StoreMetadata>, StoreError> {
        let tree = self.db.open_tree(META_TREE)?;
        match tree.get(META_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Validates the stored metadata, wiping cached payloads on mismatch.
    fn validate_metadata(&self, app_version: &str, portal_url: &str) -> Result<(), StoreError> {
        let meta_tree = self.db.open_tree(META_TREE)?;
        let existing: Option<StoreMetadata> = match meta_tree.get(META_KEY)? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(meta) => Some(meta),
                Err(err) => {
                    // Corrupt metadata is treated like a mismatch.
                    warn!("site-config: fallback store metadata unreadable: {err}");
                    None
                }
            },
            None => None,
        };

        let matches = existing
            .as_ref()
            .map(|meta| meta.app_version == app_version && meta.portal_url == portal_url)
            .unwrap_or(false);
        if matches {
            return Ok(());
        }

        if existing.is_some() {
            warn!(
                "site-config: fallback store belongs to a different deployment; discarding cached copy"
            );
        }
        self.config_tree()?.clear()?;
        let meta = StoreMetadata {
            app_version: app_version.to_owned(),
            portal_url: portal_url.to_owned(),
            creation_time: OffsetDateTime::now_utc(),
        };
        meta_tree.insert(META_KEY, serde_json::to_vec(&meta)?)?;
        self.db.flush()?;
        Ok(())
    }

    /// Opens the tree storing configuration payloads.
    fn config_tree(&self) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(CONFIG_TREE)?)
    }
}
