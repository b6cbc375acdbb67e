//! Sync service orchestration.
//!
//! This module wires the remote store, the durable fallback store, and the
//! in-memory snapshot into the service consumers call.  Reads always produce
//! a usable configuration (degrading through fallback to compiled-in
//! defaults), writes surface their failures, and the change feed delivers
//! pushed updates to registered subscribers.

use std::sync::{Arc, Weak};

use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::ServiceConfig;
use super::state::{ChangeCallback, FeedState, ServiceSnapshot, ServiceState};
use super::telemetry::{ConfigSyncTelemetry, NoopTelemetry};
use crate::config::{Provenance, SiteConfig};
use crate::remote::{RemoteError, RemoteStore};
use crate::status::SyncStatus;
use crate::store::{FallbackStore, StoreError};
use crate::translate::translate_row;

/// Error type surfaced by the sync service operations.
///
/// Only the write path ever returns these to callers; read-path failures are
/// routed through telemetry and degrade the provenance instead.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Propagates remote store failures (network issues or HTTP errors).
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),
    /// Surfaces fallback store failures.
    #[error("fallback store error: {0}")]
    Store(#[from] StoreError),
    /// JSON serialisation failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shared service internals used by the API surface and the feed task.
pub(crate) struct ServiceShared {
    /// Remote configuration store boundary.
    pub(crate) remote: Arc<dyn RemoteStore>,
    /// Durable local fallback store.
    pub(crate) fallback: FallbackStore,
    /// Mutable state guarded by a mutex.
    pub(super) state: Mutex<ServiceState>,
    /// Telemetry sink used to report service events.
    pub(crate) telemetry: RwLock<Arc<dyn ConfigSyncTelemetry>>,
    /// Status handle exposing feed liveness and last error.
    pub(crate) status: Arc<SyncStatus>,
    /// Static runtime configuration.
    pub(crate) config: ServiceConfig,
    /// Sender used to broadcast shutdown notifications to the feed task.
    pub(crate) shutdown: broadcast::Sender<()>,
    /// Join handle of the running feed task (if any).
    pub(crate) feed_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ServiceShared {
    /// Keeps debug output concise by only printing static config details.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceShared")
            .field("config", &self.config)
            .finish()
    }
}

impl ServiceShared {
    /// Returns the telemetry sink currently installed.
    pub(crate) async fn telemetry(&self) -> Arc<dyn ConfigSyncTelemetry> {
        self.telemetry.read().await.clone()
    }

    /// Persists the merged configuration to the fallback store, best effort.
    pub(crate) fn persist_fallback(&self, config: &SiteConfig) {
        match serde_json::to_string(config) {
            Ok(payload) => {
                if let Err(err) = self.fallback.set(&self.config.config_key, &payload) {
                    warn!("site-config: failed to persist fallback copy: {err}");
                }
            }
            Err(err) => {
                warn!("site-config: failed to serialise fallback copy: {err}");
            }
        }
    }

    /// Completes a read that could not reach the remote store.
    ///
    /// The fallback copy (merged over defaults) is preferred; when it is
    /// absent or unreadable the compiled-in defaults are served.  Either way
    /// the error is routed through the degraded-read telemetry hook and a
    /// log line, never to the caller.
    pub(super) async fn degraded_read(
        &self,
        error: ServiceError,
        generation: u64,
        attempt_started: Instant,
    ) -> SiteConfig {
        let (config, provenance) = match self.fallback.get(&self.config.config_key) {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(raw) => {
                    let partial = translate_row(&raw);
                    (
                        SiteConfig::defaults().merged_with(partial),
                        Provenance::Fallback,
                    )
                }
                Err(parse_err) => {
                    warn!("site-config: fallback copy unreadable: {parse_err}");
                    (SiteConfig::defaults(), Provenance::Default)
                }
            },
            Ok(None) => (SiteConfig::defaults(), Provenance::Default),
            Err(store_err) => {
                warn!("site-config: fallback store read failed: {store_err}");
                (SiteConfig::defaults(), Provenance::Default)
            }
        };

        warn!(
            provenance = provenance.as_str(),
            "site-config: remote fetch failed, serving degraded configuration: {error}"
        );
        {
            let mut guard = self.state.lock().await;
            guard.store_degraded(config.clone(), provenance, generation, attempt_started);
        }
        self.status.set_last_provenance(provenance).await;
        self.status.set_last_error(Some(error.to_string())).await;
        self.telemetry().await.on_degraded_read(provenance, &error);
        config
    }

    /// Stops the feed task and resets the feed state machine to idle.
    ///
    /// Idempotent: tearing down an already-idle feed is a no-op, and any
    /// pending reconnect timer dies with the task.
    pub(crate) async fn teardown_feed(&self) {
        let _ = self.shutdown.send(());
        let handle = { self.feed_task.lock().await.take() };
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        let mut guard = self.state.lock().await;
        guard.feed_state = FeedState::Idle;
        guard.retry_count = 0;
        drop(guard);
        self.status.set_feed_active(false);
    }
}

/// Live-synchronised view of the portal's site configuration.
///
/// The service owns its cache, reconnect timer, and callback registry; it is
/// constructed explicitly and torn down with [`ConfigSyncService::dispose`]
/// so the state machine stays testable in isolation.
#[derive(Debug, Clone)]
pub struct ConfigSyncService {
    /// Shared service internals wrapped in an atomically reference-counted pointer.
    shared: Arc<ServiceShared>,
}

impl ConfigSyncService {
    /// Builds a new service instance from a remote store, a fallback store,
    /// and runtime configuration.
    ///
    /// The configuration is sanitised up-front so callers inherit the shipped
    /// safety limits even if they forget to clamp values themselves.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        fallback: FallbackStore,
        config: ServiceConfig,
    ) -> Self {
        let config = config.sanitise();
        let (shutdown, _) = broadcast::channel(1);
        let shared = ServiceShared {
            remote,
            fallback,
            state: Mutex::new(ServiceState::new()),
            telemetry: RwLock::new(Arc::new(NoopTelemetry)),
            status: SyncStatus::new(),
            config,
            shutdown,
            feed_task: Mutex::new(None),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Returns the configuration, serving the cache when it is fresh.
    ///
    /// This function never fails: remote or storage errors degrade the
    /// provenance (fallback copy, then compiled-in defaults) instead of
    /// propagating.  `force_refresh` bypasses the freshness window.
    pub async fn get_configuration(&self, force_refresh: bool) -> SiteConfig {
        let (generation, cached) = {
            let guard = self.shared.state.lock().await;
            let cached = if force_refresh {
                None
            } else {
                guard.fresh_config(self.shared.config.freshness_window)
            };
            (guard.generation, cached)
        };
        if let Some(config) = cached {
            debug!("site-config: serving cached configuration");
            return config;
        }

        let attempt_started = Instant::now();
        match self
            .shared
            .remote
            .fetch_row(&self.shared.config.config_key)
            .await
        {
            Ok(row) => {
                // An absent row is a valid remote answer: the portal has not
                // been configured yet, so defaults apply.
                let partial = row.as_ref().map(translate_row).unwrap_or_default();
                let config = SiteConfig::defaults().merged_with(partial);
                {
                    let mut guard = self.shared.state.lock().await;
                    guard.store_remote(config.clone(), generation);
                }
                self.shared.persist_fallback(&config);
                self.shared.status.set_last_provenance(Provenance::Remote).await;
                self.shared.status.set_last_error(None).await;
                self.shared.telemetry().await.on_remote_fetch();
                config
            }
            Err(err) => {
                self.shared
                    .degraded_read(err.into(), generation, attempt_started)
                    .await
            }
        }
    }

    /// Writes the configuration to the remote store and mirrors it locally.
    ///
    /// Unlike reads, this path is user-initiated: a remote failure is still
    /// mirrored to the fallback store but surfaces to the caller so the admin
    /// UI can show that the change did not reach the source of truth.
    pub async fn save_configuration(&self, config: &SiteConfig) -> Result<(), ServiceError> {
        let row = serde_json::to_value(config)?;
        let remote_result = self
            .shared
            .remote
            .upsert_row(&self.shared.config.config_key, &row)
            .await;
        self.shared.persist_fallback(config);

        match remote_result {
            Ok(()) => {
                let mut guard = self.shared.state.lock().await;
                let generation = guard.generation;
                guard.store_remote(config.clone(), generation);
                drop(guard);
                self.shared.status.set_last_error(None).await;
                self.shared.telemetry().await.on_save_success();
                Ok(())
            }
            Err(err) => {
                let err = ServiceError::Remote(err);
                warn!("site-config: save failed to reach the remote store: {err}");
                self.shared.status.set_last_error(Some(err.to_string())).await;
                self.shared.telemetry().await.on_save_error(&err);
                Err(err)
            }
        }
    }

    /// Registers a change callback and returns an unsubscribe handle.
    ///
    /// The handle is returned immediately; updates are delivered
    /// asynchronously in the order the transport provides them, with no
    /// coalescing — callbacks must tolerate being invoked with an unchanged
    /// value.  The first subscriber starts the feed task.
    pub async fn subscribe_to_changes(
        &self,
        callback: impl Fn(SiteConfig) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let callback: ChangeCallback = Arc::new(callback);
        let (id, spawn) = {
            let mut guard = self.shared.state.lock().await;
            let id = guard.register_callback(callback);
            let spawn = guard.feed_state == FeedState::Idle;
            if spawn {
                guard.feed_state = FeedState::Connecting;
            }
            (id, spawn)
        };
        if spawn {
            let shared = self.shared.clone();
            let shutdown_rx = self.shared.shutdown.subscribe();
            let handle = tokio::spawn(async move {
                shared.run_feed_loop(shutdown_rx).await;
            });
            let mut task_guard = self.shared.feed_task.lock().await;
            *task_guard = Some(handle);
        }
        Unsubscribe {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Tears the service down: stops the feed, cancels any pending reconnect
    /// timer, clears subscribers, and invalidates in-flight fetches so their
    /// results are discarded.  Safe to call more than once.
    pub async fn dispose(&self) {
        self.shared.teardown_feed().await;
        {
            let mut guard = self.shared.state.lock().await;
            guard.generation = guard.generation.wrapping_add(1);
            guard.callbacks.clear();
        }
        if let Err(err) = self.shared.fallback.flush() {
            warn!("site-config: failed to flush fallback store during dispose: {err}");
        }
    }

    /// Returns a diagnostics snapshot describing the current service state.
    pub async fn snapshot(&self) -> ServiceSnapshot {
        let guard = self.shared.state.lock().await;
        guard.diagnostics()
    }

    /// Replaces the telemetry sink used for reporting service events.
    pub async fn set_telemetry(&self, telemetry: Arc<dyn ConfigSyncTelemetry>) {
        let mut guard = self.shared.telemetry.write().await;
        *guard = telemetry;
    }

    /// Returns a handle exposing feed liveness, last provenance, and last error.
    pub fn status_handle(&self) -> Arc<SyncStatus> {
        self.shared.status.clone()
    }

    /// Returns a reference to the static service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.shared.config
    }
}

/// Handle returned by [`ConfigSyncService::subscribe_to_changes`].
///
/// Dropping the handle does **not** unsubscribe; call
/// [`Unsubscribe::unsubscribe`] explicitly.  The call is idempotent, and
/// when the last subscriber leaves, the feed (including any pending
/// reconnect timer) is torn down.
#[derive(Debug)]
pub struct Unsubscribe {
    /// Weak reference so a forgotten handle cannot keep the service alive.
    shared: Weak<ServiceShared>,
    /// Identifier of the registered callback.
    id: u64,
}

impl Unsubscribe {
    /// Removes the callback; tears down the feed when the registry empties.
    pub async fn unsubscribe(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let teardown = {
            let mut guard = shared.state.lock().await;
            let (removed, empty) = guard.remove_callback(self.id);
            removed && empty
        };
        if teardown {
            debug!("site-config: last subscriber left; tearing down change feed");
            shared.teardown_feed().await;
        }
    }
}
