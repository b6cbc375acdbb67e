//! Telemetry helpers for the site-configuration sync layer.
//!
//! This module provides drop-in implementations of [`ConfigSyncTelemetry`]
//! that make it easy to surface metrics or integrate with external monitoring
//! systems.  Consumers can either use the provided counting primitives to
//! expose their own metrics or wrap them in application-specific emitters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Provenance;
use crate::remote::{ChangeKind, RemoteError};
use crate::service::{ConfigSyncTelemetry, ServiceError};

/// Aggregated telemetry counters (all values use relaxed atomics).
#[derive(Debug, Default)]
pub struct TelemetryCounters {
    remote_fetches: AtomicU64,
    degraded_fallback: AtomicU64,
    degraded_default: AtomicU64,
    feed_connects: AtomicU64,
    feed_events: AtomicU64,
    feed_errors: AtomicU64,
    reconnects_scheduled: AtomicU64,
    save_success: AtomicU64,
    save_errors: AtomicU64,
}

impl TelemetryCounters {
    /// Captures a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            degraded_fallback: self.degraded_fallback.load(Ordering::Relaxed),
            degraded_default: self.degraded_default.load(Ordering::Relaxed),
            feed_connects: self.feed_connects.load(Ordering::Relaxed),
            feed_events: self.feed_events.load(Ordering::Relaxed),
            feed_errors: self.feed_errors.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            save_success: self.save_success.load(Ordering::Relaxed),
            save_errors: self.save_errors.load(Ordering::Relaxed),
        }
    }
}

/// Plain data representation of [`TelemetryCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Number of successful remote fetches.
    pub remote_fetches: u64,
    /// Number of reads served from the fallback copy.
    pub degraded_fallback: u64,
    /// Number of reads served from compiled-in defaults.
    pub degraded_default: u64,
    /// Number of change-feed activations.
    pub feed_connects: u64,
    /// Number of change notifications delivered.
    pub feed_events: u64,
    /// Number of change-feed failures.
    pub feed_errors: u64,
    /// Number of reconnect attempts scheduled.
    pub reconnects_scheduled: u64,
    /// Number of successful configuration saves.
    pub save_success: u64,
    /// Number of failed configuration saves.
    pub save_errors: u64,
}

impl fmt::Display for TelemetrySnapshot {
    /// Formats the snapshot metrics into a comma-separated list for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "remote_fetches={}, degraded_fallback={}, degraded_default={}, feed_connects={}, feed_events={}, feed_errors={}, reconnects_scheduled={}, save_success={}, save_errors={}",
            self.remote_fetches,
            self.degraded_fallback,
            self.degraded_default,
            self.feed_connects,
            self.feed_events,
            self.feed_errors,
            self.reconnects_scheduled,
            self.save_success,
            self.save_errors
        )
    }
}

/// Telemetry implementation that maintains atomic counters for every signal.
///
/// This is useful when embedding the service in environments that prefer
/// collecting metrics externally: the caller can expose the
/// [`TelemetryCounters`] via statsd, OpenTelemetry, or any other metric
/// backend.
#[derive(Debug, Clone)]
pub struct CountingTelemetry {
    counters: Arc<TelemetryCounters>,
}

impl CountingTelemetry {
    /// Creates a new telemetry instance backed by the provided counter set.
    pub fn new(counters: Arc<TelemetryCounters>) -> Self {
        Self { counters }
    }

    /// Returns the underlying counter set.
    pub fn counters(&self) -> Arc<TelemetryCounters> {
        self.counters.clone()
    }
}

impl Default for CountingTelemetry {
    /// Builds a counting telemetry instance backed by fresh counters.
    fn default() -> Self {
        Self::new(Arc::new(TelemetryCounters::default()))
    }
}

impl ConfigSyncTelemetry for CountingTelemetry {
    /// Records a successful remote fetch.
    fn on_remote_fetch(&self) {
        self.counters.remote_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Classifies degraded reads by the provenance the consumer received.
    fn on_degraded_read(&self, provenance: Provenance, _error: &ServiceError) {
        match provenance {
            Provenance::Fallback => {
                self.counters
                    .degraded_fallback
                    .fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.counters
                    .degraded_default
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records a change-feed activation.
    fn on_feed_connected(&self) {
        self.counters.feed_connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a delivered change notification.
    fn on_feed_event(&self, _kind: ChangeKind) {
        self.counters.feed_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a change-feed failure.
    fn on_feed_error(&self, _error: &RemoteError) {
        self.counters.feed_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a scheduled reconnect attempt.
    fn on_reconnect_scheduled(&self, _delay: Duration, _retry_count: u32) {
        self.counters
            .reconnects_scheduled
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful configuration save.
    fn on_save_success(&self) {
        self.counters.save_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed configuration save.
    fn on_save_error(&self, _error: &ServiceError) {
        self.counters.save_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Telemetry implementation that forwards events to multiple observers.
///
/// This allows applications to combine counters with logging or custom sinks.
pub struct CompositeTelemetry {
    observers: Vec<Arc<dyn ConfigSyncTelemetry>>,
}

impl CompositeTelemetry {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Adds a telemetry observer to the dispatcher.
    pub fn with_observer(mut self, telemetry: Arc<dyn ConfigSyncTelemetry>) -> Self {
        self.observers.push(telemetry);
        self
    }

    /// Extends the dispatcher with additional observers.
    pub fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = Arc<dyn ConfigSyncTelemetry>>,
    {
        self.observers.extend(iter);
    }
}

impl Default for CompositeTelemetry {
    /// Builds an empty composite dispatcher.
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompositeTelemetry {
    /// Emits a debug struct containing the observer count.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeTelemetry")
            .field("observer_count", &self.observers.len())
            .finish()
    }
}

impl ConfigSyncTelemetry for CompositeTelemetry {
    /// Notifies all observers about a successful remote fetch.
    fn on_remote_fetch(&self) {
        for observer in &self.observers {
            observer.on_remote_fetch();
        }
    }

    /// Forwards degraded-read notifications to observers.
    fn on_degraded_read(&self, provenance: Provenance, error: &ServiceError) {
        for observer in &self.observers {
            observer.on_degraded_read(provenance, error);
        }
    }

    /// Forwards feed activation notifications.
    fn on_feed_connected(&self) {
        for observer in &self.observers {
            observer.on_feed_connected();
        }
    }

    /// Forwards change notifications to observers.
    fn on_feed_event(&self, kind: ChangeKind) {
        for observer in &self.observers {
            observer.on_feed_event(kind);
        }
    }

    /// Forwards feed failures to observers.
    fn on_feed_error(&self, error: &RemoteError) {
        for observer in &self.observers {
            observer.on_feed_error(error);
        }
    }

    /// Forwards reconnect scheduling notifications.
    fn on_reconnect_scheduled(&self, delay: Duration, retry_count: u32) {
        for observer in &self.observers {
            observer.on_reconnect_scheduled(delay, retry_count);
        }
    }

    /// Forwards save success notifications.
    fn on_save_success(&self) {
        for observer in &self.observers {
            observer.on_save_success();
        }
    }

    /// Forwards save failure notifications.
    fn on_save_error(&self, error: &ServiceError) {
        for observer in &self.observers {
            observer.on_save_error(error);
        }
    }
}
