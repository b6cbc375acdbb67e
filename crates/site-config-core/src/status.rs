//! Lightweight status helpers exposing sync health (feed liveness, last
//! read provenance, and last error) to embedders.
//!
//! The admin dashboard polls this data to show whether the portal is serving
//! live, cached, or default configuration.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Provenance;

/// Tracks the change-feed liveness flag, the provenance of the most recent
/// read, and the last error observed by the sync service.
#[derive(Debug)]
pub struct SyncStatus {
    feed_active: AtomicBool,
    last_provenance: RwLock<Option<Provenance>>,
    last_error: RwLock<Option<String>>,
}

impl SyncStatus {
    /// Creates a reference-counted status handle with no recorded activity.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            feed_active: AtomicBool::new(false),
            last_provenance: RwLock::new(None),
            last_error: RwLock::new(None),
        })
    }

    /// Returns whether the change feed is currently active.
    pub fn feed_active(&self) -> bool {
        self.feed_active.load(Ordering::Relaxed)
    }

    /// Updates the feed liveness flag.
    pub fn set_feed_active(&self, active: bool) {
        self.feed_active.store(active, Ordering::Relaxed);
    }

    /// Returns the provenance of the most recent configuration read.
    pub async fn last_provenance(&self) -> Option<Provenance> {
        *self.last_provenance.read().await
    }

    /// Records the provenance of a completed read.
    pub async fn set_last_provenance(&self, provenance: Provenance) {
        let mut guard = self.last_provenance.write().await;
        *guard = Some(provenance);
    }

    /// Returns the last error recorded by the service (if any).
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Stores the last error message (or clears it when `None`).
    pub async fn set_last_error(&self, error: Option<String>) {
        let mut guard = self.last_error.write().await;
        *guard = error;
    }

    /// Returns a status snapshot suitable for logging/exporting.
    pub async fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            feed_active: self.feed_active(),
            last_provenance: self.last_provenance().await,
            last_error: self.last_error().await,
        }
    }

    /// Helper that renders the status flags as a JSON payload.
    pub async fn to_json(&self) -> Value {
        self.snapshot().await.to_json()
    }
}

/// Serializable representation of [`SyncStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub feed_active: bool,
    pub last_provenance: Option<Provenance>,
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    /// Renders the snapshot as a JSON map consumed by the admin dashboard.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("feedActive".into(), Value::Bool(self.feed_active));
        map.insert(
            "lastProvenance".into(),
            match self.last_provenance {
                Some(provenance) => Value::String(provenance.as_str().into()),
                None => Value::Null,
            },
        );
        map.insert(
            "lastError".into(),
            match &self.last_error {
                Some(err) => Value::String(err.clone()),
                None => Value::Null,
            },
        );
        map
    }

    /// Wraps [`StatusSnapshot::to_map`] into a [`serde_json::Value`].
    pub fn to_json(&self) -> Value {
        Value::Object(self.to_map())
    }
}

/// Formats the current status as a JSON object
/// (`{"feedActive":..,"lastProvenance":..,"lastError":..}`).
pub async fn status_json(status: &SyncStatus) -> Value {
    status.snapshot().await.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    /// Ensures the status handle consistently updates flags and error fields.
    async fn status_handle_updates_fields() {
        let status = SyncStatus::new();
        status.set_feed_active(true);
        assert!(status.feed_active());
        status.set_last_provenance(Provenance::Fallback).await;
        assert_eq!(status.last_provenance().await, Some(Provenance::Fallback));
        status.set_last_error(Some("boom".into())).await;
        assert_eq!(status.last_error().await.as_deref(), Some("boom"));
        status.set_last_error(None).await;
        assert!(status.last_error().await.is_none());
    }

    #[tokio::test]
    /// Verifies the exported JSON layout consumed by the dashboard.
    async fn status_snapshot_renders_json() {
        let status = SyncStatus::new();
        status.set_feed_active(true);
        status.set_last_provenance(Provenance::Remote).await;
        status.set_last_error(Some("boom".into())).await;
        let json = status.to_json().await;
        assert_eq!(
            json,
            Value::Object(
                [
                    ("feedActive".into(), Value::Bool(true)),
                    ("lastProvenance".into(), Value::String("remote".into())),
                    ("lastError".into(), Value::String("boom".into()))
                ]
                .into_iter()
                .collect()
            )
        );
    }
}
