//! Static configuration for the sync service runtime.
//!
//! The defaults mirror the behaviour the portal shipped with: a five-minute
//! freshness window for cached reads and a constant three-second reconnect
//! delay for the change feed.

use std::time::Duration;

use tracing::warn;

/// Well-known key identifying the single configuration row.
pub const DEFAULT_CONFIG_KEY: &str = "site";
/// Window during which a remote-provenance snapshot is served without I/O.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Minimum freshness window accepted by the service.
pub const MIN_FRESHNESS_WINDOW: Duration = Duration::from_secs(5);
/// Delay between change-feed reconnect attempts (constant; no backoff growth).
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
/// Minimum reconnect delay accepted by the service.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(500);
/// Maximum reconnect delay accepted by the service.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Configuration values that control the sync service runtime.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Key of the configuration row in the remote store.
    pub config_key: String,
    /// Application version recorded in the fallback store metadata.
    pub app_version: String,
    /// How long a remote-provenance snapshot is served without refetching.
    pub freshness_window: Duration,
    /// Constant delay between feed reconnect attempts.
    pub reconnect_delay: Duration,
    /// When false the configuration skips safety clamps (intended for tests only).
    pub enforce_limits: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            config_key: DEFAULT_CONFIG_KEY.into(),
            app_version: String::new(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            enforce_limits: true,
        }
    }
}

impl ServiceConfig {
    /// Applies safety limits to runtime configuration settings.
    ///
    /// Embedders rarely want to diverge from the shipped defaults; this
    /// clamps the freshness window and reconnect delay so a typo in
    /// deployment configuration cannot hammer the backend.
    pub(crate) fn sanitise(mut self) -> Self {
        if !self.enforce_limits {
            return self;
        }

        if self.config_key.is_empty() {
            warn!(
                "config key must not be empty; using default \"{}\"",
                DEFAULT_CONFIG_KEY
            );
            self.config_key = DEFAULT_CONFIG_KEY.into();
        }

        if self.freshness_window < MIN_FRESHNESS_WINDOW {
            warn!(
                "freshness window {:?} is below the minimum {:?}; using {:?} instead",
                self.freshness_window, MIN_FRESHNESS_WINDOW, DEFAULT_FRESHNESS_WINDOW
            );
            self.freshness_window = DEFAULT_FRESHNESS_WINDOW;
        }

        if self.reconnect_delay < MIN_RECONNECT_DELAY {
            warn!(
                "reconnect delay {:?} is below the minimum {:?}; using {:?} instead",
                self.reconnect_delay, MIN_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY
            );
            self.reconnect_delay = DEFAULT_RECONNECT_DELAY;
        } else if self.reconnect_delay > MAX_RECONNECT_DELAY {
            warn!(
                "reconnect delay {:?} exceeds the maximum {:?}; clamping",
                self.reconnect_delay, MAX_RECONNECT_DELAY
            );
            self.reconnect_delay = MAX_RECONNECT_DELAY;
        }

        self
    }
}
