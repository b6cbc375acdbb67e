//! Public entry points for the site-config core crate.
//!
//! The module re-exports the building blocks required to embed the
//! site-configuration sync layer in host applications without digging into
//! the internal module layout: the data model, the remote store boundary,
//! the durable fallback store, and the sync service itself.

pub mod config;
pub mod remote;
pub mod service;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod translate;

pub use config::{CachedSnapshot, HeroImage, PartialSiteConfig, Provenance, SiteConfig};
pub use remote::{
    ChangeEvent, ChangeFeed, ChangeKind, HttpRemoteStore, RemoteError, RemoteStore,
    RemoteStoreOptions,
};
pub use service::{
    ConfigSyncService, ConfigSyncTelemetry, FeedState, ServiceConfig, ServiceError,
    ServiceSnapshot, Unsubscribe,
};
pub use status::{status_json, StatusSnapshot, SyncStatus};
pub use store::{FallbackStore, StoreError, StoreMetadata};
pub use telemetry::{CompositeTelemetry, CountingTelemetry, TelemetryCounters, TelemetrySnapshot};
pub use translate::translate_row;
