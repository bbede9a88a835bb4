//! Catalog resolution
//!
//! Normalizes the SCC catalog's duck-typed listings into [`MenuPage`]s of
//! classified [`CatalogItem`]s, runs the tiered search chain, and falls back
//! to the file host's flat search when the catalog upstream is down.
//!
//! Classification never trusts one field alone: an entry is playable if its
//! type says so or if it carries file-host stream descriptors, a directory
//! when it has a followable path, a paginator when its type marks it as a
//! page marker. Entries that fit nothing are skipped, not errored.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{json, Map};

use crate::error::ProviderError;
use crate::ident::{descriptor_candidate, is_file_host};
use crate::is_numeric_ident;
use crate::scc::types::{SccEntry, SccListing, SccMediaInfo};
use crate::scc::{self, normalize_path, SccClient};
use crate::webshare::{self, SessionManager};
use grabtv_core::config::{RateConfig, SccConfig, WebshareConfig};
use grabtv_core::models::{CatalogItem, ItemMeta, MenuPage};
use grabtv_core::ratelimit::{BurstPolicy, Decision, RateLimiter};
use grabtv_core::token;

/// Entry types that mark a leaf download target.
const PLAYABLE_TYPES: [&str; 5] = ["video", "movie", "episode", "file", "stream"];
/// Entry types that mark a non-selectable pagination marker.
const PAGINATOR_TYPES: [&str; 3] = ["next", "prev", "page"];

/// Locale fallback chain tried after the configured preference.
const FALLBACK_LANGS: [&str; 3] = ["en", "cs", "sk"];

/// Shorter queries explode into prefix wildcards on the cast endpoint.
const MIN_CAST_QUERY_LEN: usize = 3;

/// BBCode tags and HTML tags, stripped from upstream display strings.
static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[/?[^\[\]]*\]|<[^<>]*>").expect("markup regex"));

/// Strip display markup and collapse whitespace.
#[must_use]
pub fn strip_markup(raw: &str) -> String {
    let stripped = MARKUP_RE.replace_all(raw, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Localized display title: configured language first, then the fallback
/// chain, then the entry's bare title/name. Anything that strips to empty is
/// rejected so an all-markup title never reaches a menu.
fn display_label(entry: &SccEntry, preferred: &str) -> Option<String> {
    let locales = std::iter::once(preferred).chain(FALLBACK_LANGS);
    for locale in locales {
        if let Some(title) = entry
            .i18n_info
            .get(locale)
            .and_then(|info| info.title.as_deref())
        {
            let label = strip_markup(title);
            if !label.is_empty() {
                return Some(label);
            }
        }
    }
    for raw in [entry.title.as_deref(), entry.name.as_deref()]
        .into_iter()
        .flatten()
    {
        let label = strip_markup(raw);
        if !label.is_empty() {
            return Some(label);
        }
    }
    // Last resort: the bare id is stable even if ugly.
    entry.display_id()
}

/// Localized plot with the same fallback chain as titles.
fn display_summary(entry: &SccEntry, preferred: &str) -> Option<String> {
    let locales = std::iter::once(preferred).chain(FALLBACK_LANGS);
    for locale in locales {
        if let Some(plot) = entry
            .i18n_info
            .get(locale)
            .and_then(|info| info.plot.as_deref())
        {
            let summary = strip_markup(plot);
            if !summary.is_empty() {
                return Some(summary);
            }
        }
    }
    entry
        .plot
        .as_deref()
        .map(strip_markup)
        .filter(|s| !s.is_empty())
}

/// Entry artwork with the preferred locale's art overlaid on the base set.
fn display_artwork(entry: &SccEntry, preferred: &str) -> HashMap<String, String> {
    let mut artwork = entry.art.clone();
    if let Some(info) = entry.i18n_info.get(preferred) {
        artwork.extend(info.art.clone());
    }
    artwork
}

fn meta_from_info(info: &SccMediaInfo) -> ItemMeta {
    ItemMeta {
        year: info.year,
        rating: info.rating,
        season: info.season,
        episode: info.episode,
        languages: info.languages.clone(),
        ..ItemMeta::default()
    }
}

/// The browse/detail path an entry can be followed to, if any.
fn detail_path(entry: &SccEntry) -> Option<String> {
    for raw in [entry.url.as_deref(), entry.path.as_deref()]
        .into_iter()
        .flatten()
    {
        if !raw.is_empty() {
            return Some(normalize_path(raw));
        }
    }
    entry.display_id().map(|id| format!("/Play/{id}"))
}

/// Resolvable value a playable entry's token wraps, in preference order:
/// a non-numeric file-host descriptor ident, then the entry's own path,
/// then the numeric id's canonical play-path.
fn playable_value(entry: &SccEntry) -> Option<String> {
    for stream in entry.streams.iter().filter(|s| is_file_host(s)) {
        if let Some(candidate) = descriptor_candidate(stream) {
            if !is_numeric_ident(&candidate) {
                return Some(candidate);
            }
        }
    }
    detail_path(entry)
}

/// Encode a playable value as an opaque item token with display hints.
fn video_token(value: &str, label: &str, year: Option<u32>) -> String {
    let mut payload = Map::new();
    payload.insert("v".to_string(), json!(value));
    payload.insert("t".to_string(), json!(label));
    if let Some(year) = year {
        payload.insert("y".to_string(), json!(year));
    }
    token::encode(token::KIND_VIDEO, &payload)
}

fn entry_type(entry: &SccEntry) -> Option<String> {
    entry.entry_type.as_deref().map(str::to_ascii_lowercase)
}

fn is_playable(entry: &SccEntry) -> bool {
    if entry_type(entry).is_some_and(|t| PLAYABLE_TYPES.contains(&t.as_str())) {
        return true;
    }
    entry
        .streams
        .iter()
        .any(|s| is_file_host(s) && descriptor_candidate(s).is_some())
}

/// Whether an entry is worth best-effort detail enrichment.
fn movie_like(entry: &SccEntry) -> bool {
    entry_type(entry).as_deref() == Some("movie")
        || entry
            .info
            .as_ref()
            .and_then(|i| i.mediatype.as_deref())
            .is_some_and(|m| m.eq_ignore_ascii_case("movie"))
}

/// Classify one listing entry; unclassifiable entries yield `None`.
fn classify(entry: &SccEntry, preferred: &str) -> Option<CatalogItem> {
    let label = display_label(entry, preferred)?;

    if entry_type(entry).is_some_and(|t| PAGINATOR_TYPES.contains(&t.as_str())) {
        let path = detail_path(entry)?;
        return Some(CatalogItem::paginator(label, path));
    }

    if is_playable(entry) {
        let value = playable_value(entry)?;
        let year = entry.info.as_ref().and_then(|i| i.year);
        let mut item = CatalogItem::playable(label.clone(), video_token(&value, &label, year));
        item.summary = display_summary(entry, preferred);
        item.artwork = display_artwork(entry, preferred);
        if let Some(info) = &entry.info {
            item.meta = meta_from_info(info);
        }
        return Some(item);
    }

    // Anything with a followable path is a browsable sub-menu.
    let path = detail_path(entry)?;
    let mut item = CatalogItem::directory(label, path);
    item.summary = display_summary(entry, preferred);
    item.artwork = display_artwork(entry, preferred);
    Some(item)
}

/// Catalog search/browse front-end over the SCC client.
pub struct CatalogResolver {
    scc: Arc<SccClient>,
    rate: RateLimiter,
    scc_config: SccConfig,
    ws_config: WebshareConfig,
}

impl CatalogResolver {
    pub fn new(
        scc: Arc<SccClient>,
        rate: RateLimiter,
        scc_config: SccConfig,
        ws_config: WebshareConfig,
    ) -> Self {
        Self {
            scc,
            rate,
            scc_config,
            ws_config,
        }
    }

    async fn acquire(
        &self,
        provider: &str,
        bucket: &str,
        rate: &RateConfig,
        meta: serde_json::Value,
    ) -> Result<(), ProviderError> {
        let burst = BurstPolicy::from_options(rate.burst_limit, rate.burst_window_seconds);
        match self
            .rate
            .acquire(provider, bucket, rate.min_spacing_seconds, meta, burst)
            .await?
        {
            Decision::Granted => Ok(()),
            Decision::Denied {
                retry_after_seconds,
            } => Err(ProviderError::Deferred {
                retry_after_seconds,
            }),
        }
    }

    /// Tiered catalog search.
    ///
    /// Runs the chain general -> movie-scoped -> tvshow-scoped -> cast (the
    /// last only for queries of at least three characters), aggregating and
    /// deduplicating up to `limit` items. When the whole catalog upstream
    /// fails, the file host's flat search stands in; if the stand-in fails
    /// too, the catalog's error is the one propagated.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        session: &mut SessionManager,
    ) -> Result<MenuPage, ProviderError> {
        self.acquire(
            scc::PROVIDER,
            "search",
            &self.scc_config.rate,
            json!({"query": query}),
        )
        .await?;

        match self.search_catalog(query, limit).await {
            Ok(page) => Ok(page),
            Err(err) => {
                tracing::warn!("catalog search failed, trying flat file search: {err}");
                match self.search_fallback(query, limit, session).await {
                    Ok(page) => Ok(page),
                    Err(fallback_err) => {
                        tracing::debug!("flat search fallback also failed: {fallback_err}");
                        Err(err)
                    }
                }
            }
        }
    }

    /// Fetch one level of the browse hierarchy as a normalized menu.
    pub async fn browse(&self, path: &str) -> Result<MenuPage, ProviderError> {
        self.acquire(
            scc::PROVIDER,
            "browse",
            &self.scc_config.rate,
            json!({"path": path}),
        )
        .await?;
        let listing = self.scc.browse(path).await?;
        let preferred = &self.scc_config.preferred_language;

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for entry in listing.entries() {
            self.push_classified(&entry, preferred, &mut items, &mut seen, usize::MAX);
        }
        Ok(MenuPage {
            title: listing
                .title
                .clone()
                .unwrap_or_else(|| path.to_string()),
            items,
            filter: listing.filter.clone(),
        })
    }

    async fn search_catalog(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<MenuPage, ProviderError> {
        let preferred = self.scc_config.preferred_language.clone();
        let mut items: Vec<CatalogItem> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut enrich: Vec<(usize, String)> = Vec::new();
        let mut first_err: Option<ProviderError> = None;
        let mut title: Option<String> = None;

        for media_type in [None, Some("movie"), Some("tvshow")] {
            if items.len() >= limit {
                break;
            }
            match self.scc.search(query, media_type, limit).await {
                Ok(listing) => {
                    if title.is_none() {
                        title.clone_from(&listing.title);
                    }
                    self.collect(&listing, &preferred, limit, &mut items, &mut seen, &mut enrich);
                }
                Err(err) => {
                    tracing::debug!(?media_type, "search tier failed: {err}");
                    first_err.get_or_insert(err);
                }
            }
        }

        if items.len() < limit && query.chars().count() >= MIN_CAST_QUERY_LEN {
            match self.scc.search_cast(query, limit).await {
                Ok(listing) => {
                    self.collect(&listing, &preferred, limit, &mut items, &mut seen, &mut enrich);
                }
                Err(err) => {
                    tracing::debug!("cast search tier failed: {err}");
                    first_err.get_or_insert(err);
                }
            }
        }

        if items.is_empty() {
            if let Some(err) = first_err {
                return Err(err);
            }
        }

        self.enrich(&mut items, &enrich).await;

        Ok(MenuPage {
            title: title.unwrap_or_else(|| format!("Search: {query}")),
            items,
            filter: None,
        })
    }

    fn collect(
        &self,
        listing: &SccListing,
        preferred: &str,
        limit: usize,
        items: &mut Vec<CatalogItem>,
        seen: &mut HashSet<String>,
        enrich: &mut Vec<(usize, String)>,
    ) {
        for entry in listing.entries() {
            if items.len() >= limit {
                return;
            }
            let before = items.len();
            self.push_classified(&entry, preferred, items, seen, limit);
            if items.len() > before
                && enrich.len() < self.scc_config.search_enrich_limit
                && movie_like(&entry)
            {
                if let Some(path) = detail_path(&entry) {
                    enrich.push((before, path));
                }
            }
        }
    }

    fn push_classified(
        &self,
        entry: &SccEntry,
        preferred: &str,
        items: &mut Vec<CatalogItem>,
        seen: &mut HashSet<String>,
        limit: usize,
    ) {
        if items.len() >= limit {
            return;
        }
        let Some(item) = classify(entry, preferred) else {
            return;
        };
        let key = item
            .ident
            .clone()
            .or_else(|| item.path.clone())
            .unwrap_or_else(|| item.label.clone());
        if seen.insert(key) {
            items.push(item);
        }
    }

    /// Best-effort quality/size enrichment of the top movie-like hits.
    ///
    /// Shares the detail rate budget with ident resolution, so a denied slot
    /// ends enrichment early rather than deferring the whole search. Failures
    /// only lose the hint, never the result.
    async fn enrich(&self, items: &mut [CatalogItem], candidates: &[(usize, String)]) {
        let rate = &self.scc_config.rate;
        for (idx, path) in candidates.iter().take(self.scc_config.search_enrich_limit) {
            let acquired = self
                .acquire(scc::PROVIDER, "detail", rate, json!({"path": path}))
                .await;
            if let Err(err) = acquired {
                tracing::debug!("enrichment skipped, no detail budget: {err}");
                break;
            }
            match self.scc.detail(path).await {
                Ok(entry) => {
                    if let Some(item) = items.get_mut(*idx) {
                        merge_enrichment(item, &entry);
                    }
                }
                Err(err) => tracing::debug!("enrichment fetch failed for {path}: {err}"),
            }
        }
    }

    /// Flat file search on the file host, mapped into playable items.
    async fn search_fallback(
        &self,
        query: &str,
        limit: usize,
        session: &mut SessionManager,
    ) -> Result<MenuPage, ProviderError> {
        self.acquire(
            webshare::PROVIDER,
            "search",
            &self.ws_config.rate,
            json!({"query": query}),
        )
        .await?;

        let token = session.ensure_session().await?;
        let files = session.client().search(query, limit, &token).await?;

        let mut items = Vec::new();
        for file in files {
            let Some(ident) = file.ident.as_deref().filter(|i| !i.is_empty()) else {
                continue;
            };
            let label = file
                .name
                .as_deref()
                .map(strip_markup)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| ident.to_string());
            let mut item = CatalogItem::playable(label.clone(), video_token(ident, &label, None));
            item.meta.size_bytes = file.size;
            if let Some(img) = file.img.filter(|i| !i.is_empty()) {
                item.artwork.insert("thumb".to_string(), img);
            }
            items.push(item);
            if items.len() >= limit {
                break;
            }
        }

        Ok(MenuPage {
            title: format!("Search: {query}"),
            items,
            filter: None,
        })
    }
}

/// Fold the best file-host stream descriptor of a detail entry into an
/// already classified item's metadata.
fn merge_enrichment(item: &mut CatalogItem, entry: &SccEntry) {
    let best = entry
        .streams
        .iter()
        .filter(|s| is_file_host(s))
        .max_by_key(|s| s.size.unwrap_or(0));
    let Some(stream) = best else {
        return;
    };
    if item.meta.quality.is_none() {
        item.meta.quality.clone_from(&stream.quality);
    }
    if item.meta.size_bytes.is_none() {
        item.meta.size_bytes = stream.size;
    }
    if item.meta.codec.is_none() {
        item.meta.codec.clone_from(&stream.codec);
    }
    if item.meta.fps.is_none() {
        item.meta.fps = stream.fps;
    }
    if item.meta.languages.is_empty() {
        if let Some(lang) = &stream.language {
            item.meta.languages = vec![lang.clone()];
        }
    }
}
