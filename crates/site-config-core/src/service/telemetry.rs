//! Service-level telemetry abstractions.
//!
//! Read paths never surface errors to consumers, so every caught failure is
//! routed through [`ConfigSyncTelemetry::on_degraded_read`] instead; that is
//! the single place observability hooks can detect degraded states without
//! changing the consumer contract.  A no-op implementation is provided for
//! callers that do not require instrumentation.

use std::time::Duration;

use crate::config::Provenance;
use crate::remote::{ChangeKind, RemoteError};

use super::ServiceError;

/// Telemetry hook invoked on significant service events.
pub trait ConfigSyncTelemetry: Send + Sync {
    /// Called after a successful remote fetch on the read path.
    fn on_remote_fetch(&self) {}
    /// Called when a read degrades to the fallback copy or compiled-in
    /// defaults; `provenance` identifies what the consumer received.
    fn on_degraded_read(&self, _provenance: Provenance, _error: &ServiceError) {}
    /// Called when the change feed reaches the active state.
    fn on_feed_connected(&self) {}
    /// Called for every change notification delivered to subscribers.
    fn on_feed_event(&self, _kind: ChangeKind) {}
    /// Called when the feed fails (transport error or clean close).
    fn on_feed_error(&self, _error: &RemoteError) {}
    /// Called when a reconnect attempt is scheduled.
    fn on_reconnect_scheduled(&self, _delay: Duration, _retry_count: u32) {}
    /// Called after a successful configuration save.
    fn on_save_success(&self) {}
    /// Called when a save fails (the error is also surfaced to the caller).
    fn on_save_error(&self, _error: &ServiceError) {}
}

/// Default telemetry implementation that performs no-ops.
#[derive(Debug, Default)]
pub(crate) struct NoopTelemetry;

impl ConfigSyncTelemetry for NoopTelemetry {}
