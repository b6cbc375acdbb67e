//! Format translation between the external row shape and [`SiteConfig`].
//!
//! The remote store persists the configuration as a snake_case row with a
//! nested hero-image array; older deployments wrote the internal camelCase
//! shape directly.  Translation is defensive end to end: malformed payloads
//! yield an empty partial rather than an error, and the caller merges the
//! result over compiled-in defaults so the portal always renders something
//! sensible.

use serde_json::Value;
use tracing::debug;

use crate::config::{HeroImage, PartialSiteConfig};

/// Keys that only occur in the internal camelCase shape.
///
/// `heroImages` is the primary legacy marker; the remaining keys catch
/// internal records saved without a carousel so pass-through stays a fixed
/// point for every field subset.
const INTERNAL_SHAPE_KEYS: [&str; 6] = [
    "heroImages",
    "siteName",
    "logoUrl",
    "shareImageUrl",
    "currencySymbol",
    "currencyCode",
];

/// Translates a raw configuration row into a partial internal record.
///
/// Rules:
/// - Rows already in the internal shape (detected by the legacy-only
///   `heroImages` marker or any other camelCase field) pass through
///   unchanged, making the function idempotent.
/// - Otherwise each known snake_case field maps to its internal counterpart;
///   the hero list accepts either a true array or an object whose values are
///   treated as a list, preserving order.
/// - Anything unparseable degrades to an empty partial; this function never
///   fails.
pub fn translate_row(raw: &Value) -> PartialSiteConfig {
    let Some(map) = raw.as_object() else {
        debug!("site-config: translation input is not an object; using empty partial");
        return PartialSiteConfig::default();
    };

    if INTERNAL_SHAPE_KEYS.iter().any(|key| map.contains_key(*key)) {
        // Already the internal shape; deserialise as-is so repeated
        // translation is a no-op.
        return match serde_json::from_value::<PartialSiteConfig>(raw.clone()) {
            Ok(partial) => PartialSiteConfig {
                hero_images: partial.hero_images.map(drop_empty_entries),
                ..partial
            },
            Err(err) => {
                debug!("site-config: legacy row failed to deserialise: {err}");
                PartialSiteConfig::default()
            }
        };
    }

    PartialSiteConfig {
        site_name: string_field(map.get("site_name")),
        logo_url: string_field(map.get("logo_url")),
        hero_images: map.get("hero_images").and_then(hero_list),
        share_image_url: string_field(map.get("share_image_url")),
        currency_symbol: string_field(map.get("currency_symbol")),
        currency_code: string_field(map.get("currency_code")),
    }
}

/// Extracts an optional string field, tolerating wrong types.
fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_owned)
}

/// Parses the hero-image collection from either an array or an object.
///
/// Some historical writes materialised the array as an object keyed by index
/// (`{"0": {...}, "1": {...}}`); those values are read back as a list, ordered
/// numerically when every key parses as an integer.
fn hero_list(value: &Value) -> Option<Vec<HeroImage>> {
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            let mut keyed: Vec<(&String, &Value)> = map.iter().collect();
            if keyed.iter().all(|(key, _)| key.parse::<u64>().is_ok()) {
                keyed.sort_by_key(|(key, _)| key.parse::<u64>().unwrap_or(u64::MAX));
            }
            keyed.into_iter().map(|(_, entry)| entry).collect()
        }
        _ => {
            debug!("site-config: hero image list has unexpected type; ignoring");
            return None;
        }
    };
    Some(
        entries
            .into_iter()
            .filter_map(hero_entry)
            .collect::<Vec<_>>(),
    )
}

/// Parses a single hero entry, accepting snake_case or camelCase field names.
fn hero_entry(value: &Value) -> Option<HeroImage> {
    let map = value.as_object()?;
    let image_url = map
        .get("image_url")
        .or_else(|| map.get("imageUrl"))
        .and_then(Value::as_str)?;
    if image_url.is_empty() {
        // Entries without an image reference are unrenderable; drop them.
        return None;
    }
    let alt_text = map
        .get("alt_text")
        .or_else(|| map.get("altText"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(HeroImage {
        image_url: image_url.to_owned(),
        alt_text: alt_text.to_owned(),
    })
}

/// Removes entries whose image reference is empty.
fn drop_empty_entries(heroes: Vec<HeroImage>) -> Vec<HeroImage> {
    heroes
        .into_iter()
        .filter(|hero| !hero.image_url.is_empty())
        .collect()
}
