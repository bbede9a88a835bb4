//! Normalized catalog shapes
//!
//! Upstream listing payloads are duck-typed and inconsistent; everything the
//! rest of the system touches is normalized into these structs first.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Catalog item kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A leaf download target
    Playable,
    /// A browsable sub-menu
    Directory,
    /// A non-selectable "more results" marker (next/prev page)
    Paginator,
}

/// Best-effort metadata extracted from inconsistent upstream fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Quality/size hint filled in by search-result enrichment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl ItemMeta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.year.is_none()
            && self.rating.is_none()
            && self.season.is_none()
            && self.episode.is_none()
            && self.codec.is_none()
            && self.resolution.is_none()
            && self.languages.is_empty()
            && self.fps.is_none()
            && self.quality.is_none()
            && self.size_bytes.is_none()
    }
}

/// A normalized search/browse result.
///
/// Invariant: exactly one of {`ident`, `path`} is set for Playable and
/// Directory items; Paginator items carry a `path` but are never selectable.
/// The constructors below are the only way the invariant is established.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub kind: ItemKind,

    /// Display title, markup-stripped and language-preferenced
    pub label: String,

    /// Opaque ident, present only when Playable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,

    /// Hierarchical browse path, present only when Directory/Paginator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Whether the item can be selected for download/queueing
    pub selectable: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// role -> URL (poster, fanart, thumb, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artwork: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "ItemMeta::is_empty")]
    pub meta: ItemMeta,
}

impl CatalogItem {
    /// A leaf download target carrying an opaque ident.
    #[must_use]
    pub fn playable(label: impl Into<String>, ident: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Playable,
            label: label.into(),
            ident: Some(ident.into()),
            path: None,
            selectable: true,
            summary: None,
            artwork: HashMap::new(),
            meta: ItemMeta::default(),
        }
    }

    /// A browsable sub-menu carrying a follow path.
    #[must_use]
    pub fn directory(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Directory,
            label: label.into(),
            ident: None,
            path: Some(path.into()),
            selectable: true,
            summary: None,
            artwork: HashMap::new(),
            meta: ItemMeta::default(),
        }
    }

    /// A non-selectable pagination marker.
    #[must_use]
    pub fn paginator(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Paginator,
            label: label.into(),
            ident: None,
            path: Some(path.into()),
            selectable: false,
            summary: None,
            artwork: HashMap::new(),
            meta: ItemMeta::default(),
        }
    }
}

/// A browse result: one menu level with its items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuPage {
    pub title: String,
    pub items: Vec<CatalogItem>,
    /// Active filter description, when the upstream reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// One concrete downloadable rendition of a playable item.
///
/// `id` is an opaque per-variant token that deterministically re-derives the
/// same upstream stream when decoded, even across process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadVariant {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u64>,
    /// Provider-specific payload needed to re-derive the link later;
    /// round-trippable through the token codec.
    pub source: Value,
}
