//! Shared fixtures and utilities for sync-service tests.
//!
//! Consolidating these helpers keeps individual test modules focused on their
//! assertions while avoiding duplication of setup logic.

#![cfg(test)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::telemetry::ConfigSyncTelemetry;
use super::{ConfigSyncService, ServiceConfig, ServiceError};
use crate::remote::{ChangeEvent, ChangeFeed, ChangeKind, RemoteError};
use crate::store::FallbackStore;

/// One scripted feed answer: an event, a clean close, or a failure.
type FeedItem = Result<Option<ChangeEvent>, RemoteError>;

/// Remote store double driven entirely by scripted responses.
///
/// Fetches and upserts pop from queues (falling back to a configurable
/// default), and feeds are handed out in the order they were scripted so
/// reconnect behaviour can be exercised deterministically.
#[derive(Default)]
pub(crate) struct MockRemoteStore {
    /// Scripted fetch responses, popped front-first.
    fetch_script: Mutex<VecDeque<Result<Option<Value>, RemoteError>>>,
    /// Row served when the fetch script runs dry.
    default_row: Mutex<Option<Value>>,
    /// Scripted upsert responses; an empty queue answers `Ok(())`.
    upsert_script: Mutex<VecDeque<Result<(), RemoteError>>>,
    /// Scripted feed connections, popped front-first.
    feed_script: Mutex<VecDeque<Result<ScriptedFeed, RemoteError>>>,
    /// Rows passed to `upsert_row`, in call order.
    upserted_rows: Mutex<Vec<Value>>,
    /// Number of `fetch_row` invocations observed.
    fetch_calls: AtomicUsize,
    /// Number of `open_feed` invocations observed.
    feed_opens: AtomicUsize,
}

impl MockRemoteStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts the next fetch to return the given row.
    pub(crate) fn push_fetch_row(&self, row: Value) {
        self.fetch_script.lock().unwrap().push_back(Ok(Some(row)));
    }

    /// Scripts the next fetch to report an absent row.
    pub(crate) fn push_fetch_missing(&self) {
        self.fetch_script.lock().unwrap().push_back(Ok(None));
    }

    /// Scripts the next fetch to fail.
    pub(crate) fn push_fetch_error(&self, error: RemoteError) {
        self.fetch_script.lock().unwrap().push_back(Err(error));
    }

    /// Sets the row served once the fetch script is exhausted.
    pub(crate) fn set_default_row(&self, row: Value) {
        *self.default_row.lock().unwrap() = Some(row);
    }

    /// Scripts the next upsert to fail.
    pub(crate) fn push_upsert_error(&self, error: RemoteError) {
        self.upsert_script.lock().unwrap().push_back(Err(error));
    }

    /// Scripts a feed connection and returns its driver handle.
    pub(crate) fn script_feed(&self) -> FeedDriver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feed_script
            .lock()
            .unwrap()
            .push_back(Ok(ScriptedFeed { events: rx }));
        FeedDriver { tx }
    }

    /// Scripts the next feed connection attempt to fail.
    pub(crate) fn push_feed_error(&self, error: RemoteError) {
        self.feed_script.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn feed_opens(&self) -> usize {
        self.feed_opens.load(Ordering::SeqCst)
    }

    pub(crate) fn upserted_rows(&self) -> Vec<Value> {
        self.upserted_rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl crate::remote::RemoteStore for MockRemoteStore {
    async fn fetch_row(&self, _key: &str) -> Result<Option<Value>, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.fetch_script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(self.default_row.lock().unwrap().clone())
    }

    async fn upsert_row(&self, _key: &str, row: &Value) -> Result<(), RemoteError> {
        self.upserted_rows.lock().unwrap().push(row.clone());
        self.upsert_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn open_feed(&self, _key: &str) -> Result<Box<dyn ChangeFeed>, RemoteError> {
        self.feed_opens.fetch_add(1, Ordering::SeqCst);
        match self.feed_script.lock().unwrap().pop_front() {
            Some(Ok(feed)) => Ok(Box::new(feed)),
            Some(Err(err)) => Err(err),
            None => Err(RemoteError::Feed("no scripted feed available".into())),
        }
    }
}

/// Feed double replaying items pushed through its [`FeedDriver`].
struct ScriptedFeed {
    events: mpsc::UnboundedReceiver<FeedItem>,
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>, RemoteError> {
        match self.events.recv().await {
            Some(item) => item,
            // Driver dropped: behaves like a clean close from the backend.
            None => Ok(None),
        }
    }
}

/// Test-side handle driving a [`ScriptedFeed`].
#[derive(Clone)]
pub(crate) struct FeedDriver {
    tx: mpsc::UnboundedSender<FeedItem>,
}

impl FeedDriver {
    /// Delivers an update notification carrying the given row.
    pub(crate) fn send_update(&self, row: Value) {
        let _ = self.tx.send(Ok(Some(ChangeEvent {
            kind: ChangeKind::Update,
            row,
        })));
    }

    /// Delivers an insert notification carrying the given row.
    pub(crate) fn send_insert(&self, row: Value) {
        let _ = self.tx.send(Ok(Some(ChangeEvent {
            kind: ChangeKind::Insert,
            row,
        })));
    }

    /// Fails the feed with a transport error.
    pub(crate) fn fail(&self, error: RemoteError) {
        let _ = self.tx.send(Err(error));
    }

    /// Closes the feed cleanly (the service treats this like a failure).
    pub(crate) fn close(&self) {
        let _ = self.tx.send(Ok(None));
    }
}

/// Returns the base configuration shared by the tests.
///
/// Intervals are millisecond-scale so reconnect assertions run quickly;
/// `enforce_limits` is disabled to keep them below the shipped minimums.
pub(crate) fn base_config() -> ServiceConfig {
    ServiceConfig {
        config_key: "site".into(),
        app_version: "0.1.0".into(),
        freshness_window: Duration::from_millis(200),
        reconnect_delay: Duration::from_millis(50),
        enforce_limits: false,
    }
}

/// Builds a service over an ephemeral fallback store with test settings.
pub(crate) fn build_service(remote: Arc<MockRemoteStore>) -> ConfigSyncService {
    build_service_with_config(remote, base_config())
}

/// Builds a service using the provided configuration.
pub(crate) fn build_service_with_config(
    remote: Arc<MockRemoteStore>,
    config: ServiceConfig,
) -> ConfigSyncService {
    let fallback = FallbackStore::ephemeral("0.1.0", "https://backend.test").unwrap();
    ConfigSyncService::new(remote, fallback, config)
}

/// Builds a service backed by the given fallback store.
pub(crate) fn build_service_with_store(
    remote: Arc<MockRemoteStore>,
    fallback: FallbackStore,
) -> ConfigSyncService {
    ConfigSyncService::new(remote, fallback, base_config())
}

/// Sample external row in the hosted backend's snake_case shape.
pub(crate) fn external_row(site_name: &str) -> Value {
    json!({
        "site_name": site_name,
        "logo_url": "/assets/logo.svg",
        "currency_symbol": "€",
        "currency_code": "EUR",
        "hero_images": [
            { "image_url": "/assets/hero-1.jpg", "alt_text": "Harbour at dusk" }
        ]
    })
}

/// Telemetry implementation that records event counters for assertions.
#[derive(Default)]
pub(crate) struct RecordingTelemetry {
    /// Number of successful remote fetches observed.
    pub remote_fetches: AtomicUsize,
    /// Number of degraded reads observed.
    pub degraded_reads: AtomicUsize,
    /// Number of feed activations observed.
    pub feed_connects: AtomicUsize,
    /// Number of change notifications delivered.
    pub feed_events: AtomicUsize,
    /// Number of feed failures observed.
    pub feed_errors: AtomicUsize,
    /// Number of reconnects scheduled.
    pub reconnects: AtomicUsize,
    /// Number of save failures observed.
    pub save_errors: AtomicUsize,
}

impl ConfigSyncTelemetry for RecordingTelemetry {
    fn on_remote_fetch(&self) {
        self.remote_fetches.fetch_add(1, Ordering::Relaxed);
    }

    fn on_degraded_read(&self, _provenance: crate::config::Provenance, _error: &ServiceError) {
        self.degraded_reads.fetch_add(1, Ordering::Relaxed);
    }

    fn on_feed_connected(&self) {
        self.feed_connects.fetch_add(1, Ordering::Relaxed);
    }

    fn on_feed_event(&self, _kind: ChangeKind) {
        self.feed_events.fetch_add(1, Ordering::Relaxed);
    }

    fn on_feed_error(&self, _error: &RemoteError) {
        self.feed_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn on_reconnect_scheduled(&self, _delay: Duration, _retry_count: u32) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn on_save_error(&self, _error: &ServiceError) {
        self.save_errors.fetch_add(1, Ordering::Relaxed);
    }
}
