//! SCC API data structures
//!
//! Upstream payload shapes are inconsistent between endpoints and change
//! without notice, so every field is optional and decoding never assumes
//! presence. One undecodable entry must not fail a whole listing; listings
//! therefore keep entries as loose values until classification.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// A menu/listing response: one level of the browse hierarchy or one page of
/// search results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SccListing {
    #[serde(default)]
    pub title: Option<String>,
    /// Active filter description, when the upstream reports one
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub menu: Vec<Value>,
}

impl SccListing {
    /// Decode entries tolerantly: a bad entry is skipped, not fatal.
    #[must_use]
    pub fn entries(&self) -> Vec<SccEntry> {
        self.menu
            .iter()
            .filter_map(|raw| match serde_json::from_value::<SccEntry>(raw.clone()) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!("skipping undecodable listing entry: {e}");
                    None
                }
            })
            .collect()
    }
}

/// One listing entry: a playable item, a sub-menu, or a pagination marker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SccEntry {
    #[serde(rename = "type", default)]
    pub entry_type: Option<String>,

    /// Bare id; number or string depending on endpoint
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,

    /// Locale -> localized title/plot/art
    #[serde(default)]
    pub i18n_info: HashMap<String, SccI18nInfo>,

    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub plot: Option<String>,

    /// role -> URL
    #[serde(default)]
    pub art: HashMap<String, String>,

    #[serde(default)]
    pub info: Option<SccMediaInfo>,

    #[serde(default)]
    pub streams: Vec<SccStream>,
}

impl SccEntry {
    /// The bare id as a string, whether the upstream sent a number or string.
    #[must_use]
    pub fn display_id(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Localized title/plot/art for one locale
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SccI18nInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub art: HashMap<String, String>,
}

/// Best-effort media metadata block
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SccMediaInfo {
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub mediatype: Option<String>,
}

/// One stream descriptor attached to a playable entry.
///
/// The descriptor's provider tag names the file host that actually serves the
/// bytes; ident fields vary per source catalog and are tried in priority
/// order `ident, sid, uuid, file, id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SccStream {
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub ident: Option<String>,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,

    /// Followable source-catalog URL; some catalogs store a numeric
    /// placeholder and only reveal the true ident on demand via this URL
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub bitrate: Option<u64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub fps: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_deserialize_minimal() {
        let listing: SccListing = serde_json::from_str("{}").unwrap();
        assert!(listing.menu.is_empty());
        assert!(listing.title.is_none());
    }

    #[test]
    fn test_listing_skips_bad_entries() {
        let listing: SccListing = serde_json::from_value(json!({
            "menu": [
                {"type": "video", "id": 1, "title": "Good"},
                "just a string",
                {"type": "dir", "url": "/genres"}
            ]
        }))
        .unwrap();
        let entries = listing.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("Good"));
    }

    #[test]
    fn test_entry_display_id_number_and_string() {
        let e: SccEntry = serde_json::from_value(json!({"id": 4242})).unwrap();
        assert_eq!(e.display_id().as_deref(), Some("4242"));

        let e: SccEntry = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(e.display_id().as_deref(), Some("abc"));

        let e: SccEntry = serde_json::from_value(json!({"id": ""})).unwrap();
        assert!(e.display_id().is_none());

        let e: SccEntry = serde_json::from_value(json!({})).unwrap();
        assert!(e.display_id().is_none());
    }

    #[test]
    fn test_entry_with_i18n_and_streams() {
        let e: SccEntry = serde_json::from_value(json!({
            "type": "movie",
            "id": 77,
            "i18n_info": {
                "en": {"title": "The Matrix", "art": {"poster": "https://img/p.jpg"}},
                "cs": {"title": "Matrix"}
            },
            "info": {"year": 1999, "rating": 8.7, "languages": ["en"]},
            "streams": [
                {"provider": "webshare", "ident": "xyz987", "quality": "1080p", "size": 4500}
            ]
        }))
        .unwrap();
        assert_eq!(e.i18n_info["en"].title.as_deref(), Some("The Matrix"));
        assert_eq!(e.info.as_ref().unwrap().year, Some(1999));
        assert_eq!(e.streams[0].ident.as_deref(), Some("xyz987"));
        assert_eq!(e.streams[0].size, Some(4500));
    }

    #[test]
    fn test_stream_deserialize_with_numeric_id() {
        let s: SccStream = serde_json::from_value(json!({
            "provider": "ws",
            "id": 12345,
            "url": "https://source.example/stream/12345"
        }))
        .unwrap();
        assert_eq!(s.id, Some(json!(12345)));
        assert!(s.ident.is_none());
    }
}
