//! Fixtures shared by the end-to-end tests.

use std::time::Duration;

use serde_json::{json, Value};
use site_config_core::service::ServiceConfig;
use tokio::time::{sleep, Instant};

/// Sample external row in the hosted backend's snake_case shape.
pub fn external_row(site_name: &str) -> Value {
    json!({
        "site_name": site_name,
        "logo_url": "/assets/logo.svg",
        "share_image_url": "/assets/share.png",
        "currency_symbol": "£",
        "currency_code": "GBP",
        "hero_images": [
            { "image_url": "/assets/hero-1.jpg", "alt_text": "Harbour at dusk" },
            { "image_url": "/assets/hero-2.jpg", "alt_text": "Mountain pass" }
        ]
    })
}

/// Service configuration tuned for fast end-to-end runs.
pub fn service_config() -> ServiceConfig {
    ServiceConfig {
        config_key: "site".into(),
        app_version: "0.1.0".into(),
        freshness_window: Duration::from_secs(5),
        reconnect_delay: Duration::from_millis(50),
        enforce_limits: false,
    }
}

/// Polls `predicate` until it holds or the deadline passes.
pub async fn wait_until(description: &str, mut predicate: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
        assert!(
            Instant::now() < deadline,
            "condition not reached in time: {description}"
        );
        sleep(Duration::from_millis(10)).await;
    }
}
