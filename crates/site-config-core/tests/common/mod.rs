//! Shared helpers for the integration test binaries.

pub mod fixtures;
