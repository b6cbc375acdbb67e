//! Site configuration data model, compiled-in defaults, and merge rules.
//!
//! The portal renders a single global settings record: display name, logo,
//! hero carousel, social-share image, and currency display settings.  Every
//! read path in this crate funnels through [`SiteConfig::defaults`] merged
//! with whatever partial data the remote store or the local fallback copy
//! provides, so consumers always receive a fully populated record.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Default site display name shown when the remote record omits one.
pub const DEFAULT_SITE_NAME: &str = "Wayfarer Travel";
/// Default logo reference served before the operator uploads a custom one.
pub const DEFAULT_LOGO_URL: &str = "/images/logo.png";
/// Default hero image reference.
pub const DEFAULT_HERO_IMAGE_URL: &str = "/images/hero-default.jpg";
/// Alt text paired with the default hero image.
pub const DEFAULT_HERO_ALT_TEXT: &str = "Scenic coastline at sunrise";
/// Default social-share card reference.
pub const DEFAULT_SHARE_IMAGE_URL: &str = "/images/share-card.png";
/// Default currency symbol used for price display.
pub const DEFAULT_CURRENCY_SYMBOL: &str = "$";
/// Default ISO currency code.
pub const DEFAULT_CURRENCY_CODE: &str = "USD";

/// One entry in the hero carousel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroImage {
    /// Image reference (must be non-empty; empty entries are dropped during translation).
    pub image_url: String,
    /// Alt text rendered alongside the image.
    #[serde(default)]
    pub alt_text: String,
}

/// The single global site-settings record.
///
/// Serialised with camelCase field names; `heroImages` doubles as the marker
/// that distinguishes this shape from the external row representation (see
/// [`crate::translate`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// Site display name shown in the header and page titles.
    pub site_name: String,
    /// Logo reference.
    pub logo_url: String,
    /// Ordered hero carousel entries (1..N, insertion order preserved).
    pub hero_images: Vec<HeroImage>,
    /// Default social-sharing image reference.
    pub share_image_url: String,
    /// Currency symbol used for price display.
    pub currency_symbol: String,
    /// ISO currency code.
    pub currency_code: String,
}

impl SiteConfig {
    /// Returns the compiled-in default configuration.
    ///
    /// These values are the last line of defence: they are what the portal
    /// renders when both the remote store and the local fallback are
    /// unavailable or empty.
    pub fn defaults() -> Self {
        Self {
            site_name: DEFAULT_SITE_NAME.into(),
            logo_url: DEFAULT_LOGO_URL.into(),
            hero_images: vec![HeroImage {
                image_url: DEFAULT_HERO_IMAGE_URL.into(),
                alt_text: DEFAULT_HERO_ALT_TEXT.into(),
            }],
            share_image_url: DEFAULT_SHARE_IMAGE_URL.into(),
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.into(),
            currency_code: DEFAULT_CURRENCY_CODE.into(),
        }
    }

    /// Merges a partial record over this configuration, field by field.
    ///
    /// Only non-empty values override: an absent or empty string leaves the
    /// base field untouched, and an absent or empty hero list keeps the base
    /// carousel.  Hero entry order from the partial is preserved as-is.
    pub fn merged_with(mut self, partial: PartialSiteConfig) -> Self {
        if let Some(value) = non_empty(partial.site_name) {
            self.site_name = value;
        }
        if let Some(value) = non_empty(partial.logo_url) {
            self.logo_url = value;
        }
        if let Some(heroes) = partial.hero_images {
            if !heroes.is_empty() {
                self.hero_images = heroes;
            }
        }
        if let Some(value) = non_empty(partial.share_image_url) {
            self.share_image_url = value;
        }
        if let Some(value) = non_empty(partial.currency_symbol) {
            self.currency_symbol = value;
        }
        if let Some(value) = non_empty(partial.currency_code) {
            self.currency_code = value;
        }
        self
    }
}

impl Default for SiteConfig {
    /// Aliases [`SiteConfig::defaults`] so serde and builders see the same values.
    fn default() -> Self {
        Self::defaults()
    }
}

/// Filters out `None` and empty-string values during merges.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Partially populated configuration produced by translation.
///
/// Every field is optional; [`SiteConfig::merged_with`] decides which fields
/// actually override the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialSiteConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero_images: Option<Vec<HeroImage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
}

impl PartialSiteConfig {
    /// Returns `true` when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.site_name.is_none()
            && self.logo_url.is_none()
            && self.hero_images.is_none()
            && self.share_image_url.is_none()
            && self.currency_symbol.is_none()
            && self.currency_code.is_none()
    }
}

impl From<SiteConfig> for PartialSiteConfig {
    /// Lifts a full configuration into the partial shape (used by save paths).
    fn from(config: SiteConfig) -> Self {
        Self {
            site_name: Some(config.site_name),
            logo_url: Some(config.logo_url),
            hero_images: Some(config.hero_images),
            share_image_url: Some(config.share_image_url),
            currency_symbol: Some(config.currency_symbol),
            currency_code: Some(config.currency_code),
        }
    }
}

/// Origin of a configuration value returned to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Fetched from the remote configuration store.
    Remote,
    /// Read from the local durable fallback copy.
    Fallback,
    /// Compiled-in defaults; neither remote nor fallback was usable.
    Default,
}

impl Provenance {
    /// Returns a stable label for logs and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Fallback => "fallback",
            Self::Default => "default",
        }
    }
}

/// The in-memory last-known-good configuration plus freshness bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedSnapshot {
    /// Fully merged configuration.
    pub config: SiteConfig,
    /// Instant the snapshot was produced.
    pub fetched_at: Instant,
    /// Where the snapshot came from.
    pub provenance: Provenance,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ensures empty partials leave the defaults untouched.
    #[test]
    fn merge_with_empty_partial_returns_defaults() {
        let merged = SiteConfig::defaults().merged_with(PartialSiteConfig::default());
        assert_eq!(merged, SiteConfig::defaults());
    }

    /// Verifies only non-empty fields override during a merge.
    #[test]
    fn merge_skips_empty_strings_and_lists() {
        let partial = PartialSiteConfig {
            site_name: Some(String::new()),
            logo_url: Some("/custom/logo.svg".into()),
            hero_images: Some(Vec::new()),
            ..Default::default()
        };
        let merged = SiteConfig::defaults().merged_with(partial);
        assert_eq!(merged.site_name, DEFAULT_SITE_NAME);
        assert_eq!(merged.logo_url, "/custom/logo.svg");
        assert_eq!(merged.hero_images, SiteConfig::defaults().hero_images);
    }

    /// Confirms hero entries keep the order provided by the partial.
    #[test]
    fn merge_preserves_hero_order() {
        let heroes = vec![
            HeroImage {
                image_url: "/a.jpg".into(),
                alt_text: "a".into(),
            },
            HeroImage {
                image_url: "/b.jpg".into(),
                alt_text: "b".into(),
            },
        ];
        let partial = PartialSiteConfig {
            hero_images: Some(heroes.clone()),
            ..Default::default()
        };
        let merged = SiteConfig::defaults().merged_with(partial);
        assert_eq!(merged.hero_images, heroes);
    }

    /// Checks the camelCase wire shape round-trips through serde.
    #[test]
    fn config_serialises_with_camel_case_names() {
        let json = serde_json::to_value(SiteConfig::defaults()).unwrap();
        assert!(json.get("siteName").is_some());
        assert!(json.get("heroImages").is_some());
        assert!(json.get("currencyCode").is_some());
        let back: SiteConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, SiteConfig::defaults());
    }

    /// Provenance labels are stable strings used in logs and status JSON.
    #[test]
    fn provenance_labels_are_stable() {
        assert_eq!(Provenance::Remote.as_str(), "remote");
        assert_eq!(Provenance::Fallback.as_str(), "fallback");
        assert_eq!(Provenance::Default.as_str(), "default");
    }
}
