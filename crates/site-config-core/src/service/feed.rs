//! Change-feed task: subscription lifecycle and reconnect loop.
//!
//! The task runs the feed state machine: connect, deliver notifications,
//! and on any failure wait a constant delay before reconnecting.  A
//! shutdown broadcast (sent by unsubscribe or dispose) wins every select,
//! so a pending reconnect timer dies with the task instead of firing later.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::core::ServiceShared;
use super::state::FeedState;
use crate::config::{Provenance, SiteConfig};
use crate::remote::{ChangeEvent, RemoteError};
use crate::translate::translate_row;

impl ServiceShared {
    /// Runs the change-feed subscription until shutdown is signalled.
    ///
    /// Every failure path converges on the same constant-interval reconnect
    /// sleep; the retry counter only resets once a subscription reaches the
    /// active state again.
    pub(crate) async fn run_feed_loop(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            {
                let mut guard = self.state.lock().await;
                guard.feed_state = FeedState::Connecting;
            }
            debug!("site-config: opening change feed");

            let connect = self.remote.open_feed(&self.config.config_key);
            let feed = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("site-config: feed task shutting down");
                    return;
                }
                result = connect => result,
            };

            match feed {
                Ok(mut feed) => {
                    {
                        let mut guard = self.state.lock().await;
                        guard.record_feed_active();
                    }
                    self.status.set_feed_active(true);
                    self.telemetry().await.on_feed_connected();
                    debug!("site-config: change feed active");

                    loop {
                        tokio::select! {
                            biased;
                            _ = shutdown_rx.recv() => {
                                debug!("site-config: feed task shutting down");
                                return;
                            }
                            event = feed.next_event() => match event {
                                Ok(Some(event)) => self.deliver_event(event).await,
                                Ok(None) => {
                                    self.note_feed_failure(RemoteError::Feed(
                                        "change feed closed by peer".into(),
                                    ))
                                    .await;
                                    break;
                                }
                                Err(err) => {
                                    self.note_feed_failure(err).await;
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(err) => {
                    self.note_feed_failure(err).await;
                }
            }

            let delay = self.config.reconnect_delay;
            let retry_count = { self.state.lock().await.retry_count };
            self.telemetry()
                .await
                .on_reconnect_scheduled(delay, retry_count);
            debug!(
                retry_count,
                "site-config: change feed reconnect scheduled in {:?}", delay
            );
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("site-config: feed task shutting down");
                    return;
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// Translates, caches, persists, and fans out a pushed change.
    ///
    /// Notifications are delivered in transport order without coalescing;
    /// subscribers may observe a value identical to the previous one.
    async fn deliver_event(&self, event: ChangeEvent) {
        let partial = translate_row(&event.row);
        let config = SiteConfig::defaults().merged_with(partial);
        let callbacks = {
            let mut guard = self.state.lock().await;
            let generation = guard.generation;
            guard.store_remote(config.clone(), generation);
            guard.callbacks()
        };
        self.persist_fallback(&config);
        self.status.set_last_provenance(Provenance::Remote).await;
        self.telemetry().await.on_feed_event(event.kind);
        for callback in callbacks {
            callback(config.clone());
        }
    }

    /// Records a feed failure in the state machine, status handle, and telemetry.
    async fn note_feed_failure(&self, error: RemoteError) {
        warn!("site-config: change feed failed: {error}");
        {
            let mut guard = self.state.lock().await;
            guard.record_feed_failure(error.to_string());
        }
        self.status.set_feed_active(false);
        self.status.set_last_error(Some(error.to_string())).await;
        self.telemetry().await.on_feed_error(&error);
    }
}
