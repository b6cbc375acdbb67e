//! Site-configuration sync service module facade.
//!
//! This module re-exports the high-level service API while wiring the
//! specialised submodules that implement the feed state machine, runtime
//! configuration, telemetry, and diagnostics.

pub(crate) mod config;
mod core;
pub(crate) mod feed;
pub(crate) mod state;
pub(crate) mod telemetry;
#[cfg(test)]
pub(crate) mod test_support;

pub use config::ServiceConfig;
pub use core::*;
pub use state::{FeedState, ServiceSnapshot};
pub use telemetry::ConfigSyncTelemetry;
