//! Mutable sync-service state and supporting helpers.
//!
//! This module encapsulates the state manipulated by the sync service: the
//! cached snapshot, the change-feed state machine bookkeeping, and the
//! subscriber callback registry.  The parent `service` module coordinates the
//! background feed task that mutates this state; consumers interact through
//! the public API exposed by `ConfigSyncService`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{CachedSnapshot, Provenance, SiteConfig};

/// Callback invoked with every configuration pushed over the change feed.
pub type ChangeCallback = Arc<dyn Fn(SiteConfig) + Send + Sync>;

/// Connection state of the change-feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// No subscription requested, or torn down after unsubscribe.
    Idle,
    /// Subscription attempt in flight.
    Connecting,
    /// Subscription acknowledged; notifications are being delivered.
    Active,
    /// Transport failure observed; a reconnect is pending.
    Failed,
}

impl FeedState {
    /// Returns a stable label for logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

/// Snapshot exposing high-level service state for diagnostics and testing.
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    /// Current change-feed connection state.
    pub feed_state: FeedState,
    /// Consecutive failed connection attempts since the feed was last active.
    pub retry_count: u32,
    /// Provenance of the cached snapshot (if one exists).
    pub provenance: Option<Provenance>,
    /// Age of the cached snapshot.
    pub snapshot_age: Option<Duration>,
    /// Number of registered change subscribers.
    pub subscriber_count: usize,
    /// Most recent error message recorded by the service (if any).
    pub last_error: Option<String>,
}

/// Internal structure encapsulating mutable service state guarded by a mutex.
pub(super) struct ServiceState {
    /// Last-known-good configuration plus freshness bookkeeping.
    pub(super) snapshot: Option<CachedSnapshot>,
    /// Bumped on dispose so in-flight fetches cannot write stale snapshots.
    pub(super) generation: u64,
    /// Change-feed state machine position.
    pub(super) feed_state: FeedState,
    /// Consecutive failed connection attempts; resets only on `Active`.
    pub(super) retry_count: u32,
    /// Registered subscriber callbacks in registration order.
    pub(super) callbacks: Vec<(u64, ChangeCallback)>,
    /// Identifier handed to the next subscriber.
    pub(super) next_callback_id: u64,
    /// Cached error message from the most recent failure.
    pub(super) last_error: Option<String>,
}

impl ServiceState {
    /// Constructs the initial (idle, empty) state.
    pub(super) fn new() -> Self {
        Self {
            snapshot: None,
            generation: 0,
            feed_state: FeedState::Idle,
            retry_count: 0,
            callbacks: Vec::new(),
            next_callback_id: 0,
            last_error: None,
        }
    }

    /// Returns the cached configuration when it is fresh enough to serve.
    ///
    /// Only remote-provenance snapshots short-circuit the fetch: a degraded
    /// snapshot must not suppress the retry that could restore live data.
    pub(super) fn fresh_config(&self, window: Duration) -> Option<SiteConfig> {
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.provenance != Provenance::Remote {
            return None;
        }
        if snapshot.fetched_at.elapsed() < window {
            Some(snapshot.config.clone())
        } else {
            None
        }
    }

    /// Replaces the snapshot with a freshly fetched remote configuration.
    ///
    /// The write is dropped when the service was disposed (generation bumped)
    /// while the fetch was in flight.
    pub(super) fn store_remote(&mut self, config: SiteConfig, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.snapshot = Some(CachedSnapshot {
            config,
            fetched_at: Instant::now(),
            provenance: Provenance::Remote,
        });
        self.last_error = None;
        true
    }

    /// Stores a degraded (fallback or default) snapshot.
    ///
    /// A degraded result must never overwrite a remote snapshot that became
    /// available after this read attempt started; that would replace live
    /// data with stale cache.
    pub(super) fn store_degraded(
        &mut self,
        config: SiteConfig,
        provenance: Provenance,
        generation: u64,
        attempt_started: Instant,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        if let Some(existing) = &self.snapshot {
            if existing.provenance == Provenance::Remote && existing.fetched_at >= attempt_started {
                return false;
            }
        }
        self.snapshot = Some(CachedSnapshot {
            config,
            fetched_at: Instant::now(),
            provenance,
        });
        true
    }

    /// Registers a subscriber callback and returns its identifier.
    pub(super) fn register_callback(&mut self, callback: ChangeCallback) -> u64 {
        let id = self.next_callback_id;
        self.next_callback_id += 1;
        self.callbacks.push((id, callback));
        id
    }

    /// Removes a subscriber; returns `(removed, registry_now_empty)`.
    pub(super) fn remove_callback(&mut self, id: u64) -> (bool, bool) {
        let before = self.callbacks.len();
        self.callbacks.retain(|(cb_id, _)| *cb_id != id);
        let removed = self.callbacks.len() != before;
        (removed, self.callbacks.is_empty())
    }

    /// Returns the registered callbacks in registration order.
    pub(super) fn callbacks(&self) -> Vec<ChangeCallback> {
        self.callbacks.iter().map(|(_, cb)| cb.clone()).collect()
    }

    /// Records the feed reaching the active state; resets the retry counter.
    pub(super) fn record_feed_active(&mut self) {
        self.feed_state = FeedState::Active;
        self.retry_count = 0;
        self.last_error = None;
    }

    /// Records a feed failure and increments the retry counter.
    pub(super) fn record_feed_failure(&mut self, error: String) {
        self.feed_state = FeedState::Failed;
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error);
    }

    /// Returns an immutable snapshot used by diagnostics and unit tests.
    pub(super) fn diagnostics(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            feed_state: self.feed_state,
            retry_count: self.retry_count,
            provenance: self.snapshot.as_ref().map(|s| s.provenance),
            snapshot_age: self.snapshot.as_ref().map(|s| s.fetched_at.elapsed()),
            subscriber_count: self.callbacks.len(),
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config_named(name: &str) -> SiteConfig {
        SiteConfig {
            site_name: name.into(),
            ..SiteConfig::defaults()
        }
    }

    /// Only remote-provenance snapshots satisfy the freshness check.
    #[test]
    fn degraded_snapshots_never_short_circuit() {
        let mut state = ServiceState::new();
        let stored = state.store_degraded(
            config_named("cached"),
            Provenance::Fallback,
            0,
            Instant::now(),
        );
        assert!(stored);
        assert!(state.fresh_config(Duration::from_secs(300)).is_none());

        assert!(state.store_remote(config_named("live"), 0));
        let fresh = state.fresh_config(Duration::from_secs(300)).unwrap();
        assert_eq!(fresh.site_name, "live");
    }

    /// A degraded result must not replace a remote snapshot that landed after
    /// the failed attempt began.
    #[test]
    fn degraded_write_skips_newer_remote_snapshot() {
        let mut state = ServiceState::new();
        let attempt_started = Instant::now();
        assert!(state.store_remote(config_named("live"), 0));
        let stored = state.store_degraded(
            config_named("stale"),
            Provenance::Fallback,
            0,
            attempt_started,
        );
        assert!(!stored);
        assert_eq!(state.snapshot.unwrap().config.site_name, "live");
    }

    /// Generation bumps discard in-flight writes of either provenance.
    #[test]
    fn stale_generation_writes_are_dropped() {
        let mut state = ServiceState::new();
        state.generation = 1;
        assert!(!state.store_remote(config_named("old"), 0));
        assert!(!state.store_degraded(
            config_named("old"),
            Provenance::Default,
            0,
            Instant::now()
        ));
        assert!(state.snapshot.is_none());
    }

    /// The retry counter grows on failures and resets only on `Active`.
    #[test]
    fn retry_counter_resets_on_active() {
        let mut state = ServiceState::new();
        state.record_feed_failure("drop".into());
        state.record_feed_failure("drop".into());
        assert_eq!(state.retry_count, 2);
        assert_eq!(state.feed_state, FeedState::Failed);
        state.record_feed_active();
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.feed_state, FeedState::Active);
        assert!(state.last_error.is_none());
    }

    /// Callbacks are invoked in registration order and removal is precise.
    #[test]
    fn callback_registry_preserves_order() {
        let mut state = ServiceState::new();
        let order = Arc::new(AtomicUsize::new(0));
        let first_seen = Arc::new(AtomicUsize::new(0));
        let second_seen = Arc::new(AtomicUsize::new(0));

        let (order_a, seen_a) = (order.clone(), first_seen.clone());
        let a = state.register_callback(Arc::new(move |_| {
            seen_a.store(order_a.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
        }));
        let (order_b, seen_b) = (order, second_seen.clone());
        let _b = state.register_callback(Arc::new(move |_| {
            seen_b.store(order_b.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
        }));

        for callback in state.callbacks() {
            callback(SiteConfig::defaults());
        }
        assert_eq!(first_seen.load(Ordering::SeqCst), 0);
        assert_eq!(second_seen.load(Ordering::SeqCst), 1);

        let (removed, empty) = state.remove_callback(a);
        assert!(removed);
        assert!(!empty);
        let (removed_again, _) = state.remove_callback(a);
        assert!(!removed_again);
    }
}
