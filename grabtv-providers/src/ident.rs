//! Ident resolution
//!
//! Turns an opaque externally-issued value (token, browse path, numeric
//! display id, or full URL) into the file-host ident the link-mint endpoint
//! accepts. The source catalog and the file host disagree about identifiers:
//! catalog entries often carry numeric placeholders that the host rejects, so
//! resolution scans detail-fetch stream descriptors for a better candidate,
//! deprioritizing anything that looks purely numeric.
//!
//! Detail fetches are expensive and heavily rate-limited upstream. They are
//! throttled by a dedicated per-instance interval on top of the generic rate
//! limiter; a throttled request lands on the instance's fetch queue and
//! surfaces as `Deferred`, never as a blocking wait.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

use crate::error::ProviderError;
use crate::is_numeric_ident;
use crate::scc::types::{SccEntry, SccStream};
use crate::scc::{normalize_path, SccClient};
use grabtv_core::config::SccConfig;
use grabtv_core::models::DownloadVariant;
use grabtv_core::ratelimit::{BurstPolicy, Decision, RateLimiter};
use grabtv_core::token;

/// Provider tag synonyms marking a descriptor as served by the file host.
const FILE_HOST_TAGS: [&str; 3] = ["webshare", "ws", "webshare.cz"];

/// Canonical play-path for a bare numeric display id.
fn play_path(id: &str) -> String {
    format!("/Play/{id}")
}

fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Whether a descriptor belongs to the target file host.
pub(crate) fn is_file_host(stream: &SccStream) -> bool {
    stream
        .provider
        .as_deref()
        .is_some_and(|p| FILE_HOST_TAGS.iter().any(|t| p.eq_ignore_ascii_case(t)))
}

/// First present ident field, in priority order `ident, sid, uuid, file, id`.
pub(crate) fn descriptor_candidate(stream: &SccStream) -> Option<String> {
    let fields = [
        stream.ident.as_deref(),
        stream.sid.as_deref(),
        stream.uuid.as_deref(),
        stream.file.as_deref(),
    ];
    for field in fields.into_iter().flatten() {
        if !field.is_empty() {
            return Some(field.to_string());
        }
    }
    match &stream.id {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolves opaque values to concrete file-host idents.
///
/// Instance-scoped: the fetch queue and throttle clock are not shared; one
/// resolver per inbound request or worker tick.
pub struct IdentResolver {
    client: Arc<SccClient>,
    rate: RateLimiter,
    config: SccConfig,
    last_detail_fetch: Option<Instant>,
    queue: VecDeque<String>,
    queued: HashSet<String>,
}

impl IdentResolver {
    pub fn new(client: Arc<SccClient>, rate: RateLimiter, config: SccConfig) -> Self {
        Self {
            client,
            rate,
            config,
            last_detail_fetch: None,
            queue: VecDeque::new(),
            queued: HashSet::new(),
        }
    }

    /// Resolve an opaque value to a file-host ident (or pass a URL through).
    ///
    /// Classification:
    /// 1. full URL: terminal, returned as-is
    /// 2./3. path-like: detail-fetch-and-scan, raw path as last fallback
    /// 4. bare numeric: proactive detail scan keyed off the original value;
    ///    any failure there is non-fatal and the numeric value proceeds
    pub async fn resolve(&mut self, value: &str) -> Result<String, ProviderError> {
        // Variant tokens carry the file-host ident directly; only a numeric
        // placeholder ident needs the full pipeline.
        if token::has_kind(value, token::KIND_STREAM) {
            let (_, payload) = token::decode(value)?;
            if let Some(ident) = payload.get("ident").and_then(Value::as_str) {
                if !ident.is_empty() && !is_numeric_ident(ident) {
                    return Ok(ident.to_string());
                }
            }
        }

        let raw = unwrap_token(value)?;

        if is_url(&raw) {
            return Ok(raw);
        }

        if is_numeric_ident(&raw) {
            // The numeric form is probably a display id the host will
            // reject; try to trade it for a real ident first.
            match self.detail_scan(&play_path(&raw)).await {
                Ok(Some(found)) if !is_numeric_ident(&found) => return Ok(found),
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!("numeric ident pre-resolution failed: {err}");
                }
            }
            return Ok(raw);
        }

        let path = normalize_path(&raw);
        match self.detail_scan(&path).await {
            Ok(Some(found)) => Ok(found),
            // Extraction came up empty or the path was not fetchable at all:
            // the raw value is the final fallback, unmodified, since it may
            // already be a bare file-host ident rather than a browse path.
            Ok(None) => Ok(raw),
            Err(err @ ProviderError::Deferred { .. }) => Err(err),
            Err(err) => {
                tracing::debug!("detail scan for {path} failed, using raw value: {err}");
                Ok(raw)
            }
        }
    }

    /// List the concrete downloadable renditions of a playable value.
    pub async fn list_variants(
        &mut self,
        value: &str,
    ) -> Result<Vec<DownloadVariant>, ProviderError> {
        let raw = unwrap_token(value)?;
        if is_url(&raw) {
            return Err(ProviderError::NotFound(
                "URLs carry no variant listing".to_string(),
            ));
        }

        let path = if is_numeric_ident(&raw) {
            play_path(&raw)
        } else {
            normalize_path(&raw)
        };

        let entry = self.fetch_detail(&path).await?;
        let label = entry
            .title
            .clone()
            .or_else(|| entry.name.clone())
            .unwrap_or_else(|| path.clone());

        let mut variants = Vec::new();
        for stream in entry.streams.iter().filter(|s| is_file_host(s)) {
            let Some(candidate) = descriptor_candidate(stream) else {
                continue;
            };
            let source = variant_source(&candidate, stream);
            let mut payload = Map::new();
            for (k, v) in source.as_object().into_iter().flatten() {
                payload.insert(k.clone(), v.clone());
            }
            variants.push(DownloadVariant {
                id: token::encode(token::KIND_STREAM, &payload),
                title: label.clone(),
                quality: stream.quality.clone(),
                language: stream.language.clone(),
                size_bytes: stream.size,
                bitrate_kbps: stream.bitrate,
                source,
            });
        }

        if variants.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "No file-host streams for {path}"
            )));
        }
        Ok(variants)
    }

    /// Retry the classification pipeline with alternate path candidates after
    /// a mint rejection. At most one recovery per mint call; the caller
    /// enforces that bound.
    pub async fn recover(
        &mut self,
        original: &str,
        failed_ident: &str,
    ) -> Result<Option<String>, ProviderError> {
        let raw = unwrap_token(original).unwrap_or_else(|_| original.to_string());

        for candidate in recovery_candidates(&raw) {
            let entry = match self.fetch_detail_now(&candidate).await {
                Ok(entry) => entry,
                Err(err @ ProviderError::Deferred { .. }) => return Err(err),
                Err(err) => {
                    tracing::debug!("recovery candidate {candidate} failed: {err}");
                    continue;
                }
            };
            match self.extract_from_streams(&entry.streams).await? {
                Some(found) if found != failed_ident => {
                    tracing::debug!(candidate, "recovered alternate ident after mint rejection");
                    return Ok(Some(found));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Drain deferred detail fetches while the throttle allows, without
    /// blocking. Returns how many queued paths were processed.
    pub async fn process_queue(&mut self, max_items: usize) -> Result<usize, ProviderError> {
        let mut processed = 0;
        while processed < max_items {
            if self.throttle_remaining().is_some() {
                break;
            }
            let Some(path) = self.queue.pop_front() else {
                break;
            };
            self.queued.remove(&path);

            match self.detail_scan(&path).await {
                Ok(_) => processed += 1,
                Err(ProviderError::Deferred { .. }) => break,
                Err(err) => {
                    // One bad path must not stall the queue.
                    tracing::debug!("queued detail fetch failed for {path}: {err}");
                    processed += 1;
                }
            }
        }
        Ok(processed)
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Seconds until the next detail fetch is allowed, if throttled.
    fn throttle_remaining(&self) -> Option<u64> {
        let interval = Duration::from_secs(self.config.detail_fetch_interval_seconds);
        let last = self.last_detail_fetch?;
        let elapsed = last.elapsed();
        if elapsed < interval {
            Some((interval - elapsed).as_secs().max(1))
        } else {
            None
        }
    }

    fn enqueue(&mut self, path: &str) {
        if self.queued.insert(path.to_string()) {
            self.queue.push_back(path.to_string());
        }
    }

    /// Detail fetch guarded by the instance throttle and the generic rate
    /// limiter. Throttled paths land on the queue and surface as `Deferred`.
    async fn fetch_detail(&mut self, path: &str) -> Result<SccEntry, ProviderError> {
        if let Some(retry_after_seconds) = self.throttle_remaining() {
            self.enqueue(path);
            return Err(ProviderError::Deferred {
                retry_after_seconds,
            });
        }

        match self.fetch_detail_now(path).await {
            Err(err @ ProviderError::Deferred { .. }) => {
                self.enqueue(path);
                Err(err)
            }
            other => other,
        }
    }

    /// Detail fetch gated by the generic rate limiter only. Recovery after a
    /// mint rejection goes through here: a bounded single retry answering a
    /// hard upstream failure skips the instance throttle, which the fetch in
    /// `resolve` would otherwise have armed against it.
    async fn fetch_detail_now(&mut self, path: &str) -> Result<SccEntry, ProviderError> {
        let burst = BurstPolicy::from_options(
            self.config.rate.burst_limit,
            self.config.rate.burst_window_seconds,
        );
        let decision = self
            .rate
            .acquire(
                crate::scc::PROVIDER,
                "detail",
                self.config.rate.min_spacing_seconds,
                json!({"path": path}),
                burst,
            )
            .await?;
        if let Decision::Denied {
            retry_after_seconds,
        } = decision
        {
            return Err(ProviderError::Deferred {
                retry_after_seconds,
            });
        }

        self.last_detail_fetch = Some(Instant::now());
        self.client.detail(path).await
    }

    async fn detail_scan(&mut self, path: &str) -> Result<Option<String>, ProviderError> {
        let entry = self.fetch_detail(path).await?;
        self.extract_from_streams(&entry.streams).await
    }

    /// Scan file-host descriptors for a usable ident.
    ///
    /// Per descriptor the first present priority field is the candidate; a
    /// purely numeric candidate is kept only as a fallback while scanning
    /// continues. For a numeric candidate with a followable URL, the source
    /// catalog is asked once for its canonical ident; nothing from that
    /// lookup is cached because the revealed ident can be short-lived.
    async fn extract_from_streams(
        &self,
        streams: &[SccStream],
    ) -> Result<Option<String>, ProviderError> {
        let mut numeric_fallback: Option<String> = None;

        for stream in streams.iter().filter(|s| is_file_host(s)) {
            let Some(candidate) = descriptor_candidate(stream) else {
                continue;
            };
            if !is_numeric_ident(&candidate) {
                return Ok(Some(candidate));
            }

            if let Some(url) = stream.url.as_deref() {
                match self.client.resolve_stream_url(url).await {
                    Ok(Some(ident)) if !is_numeric_ident(&ident) => {
                        return Ok(Some(ident));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!("source ident lookup failed for {url}: {err}");
                    }
                }
            }
            numeric_fallback.get_or_insert(candidate);
        }

        Ok(numeric_fallback)
    }
}

/// Alternate path candidates for a single-shot recovery attempt. A value
/// that is already path-shaped is retried as-is; only slash-free values get
/// a synthesized play-path variant.
fn recovery_candidates(raw: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    if is_numeric_ident(raw) {
        candidates.push(play_path(raw));
        candidates.push(format!("/{raw}"));
    } else if is_url(raw) {
        candidates.push(normalize_path(raw));
    } else {
        let normalized = normalize_path(raw);
        let trimmed = normalized.trim_start_matches('/');
        if !trimmed.contains('/') {
            candidates.push(play_path(trimmed));
        }
        candidates.push(normalized);
    }
    candidates
}

/// Unwrap an encoded token to its inner resolvable value; non-tokens pass
/// through unchanged. A malformed caller-supplied token is a client-input
/// error.
fn unwrap_token(value: &str) -> Result<String, ProviderError> {
    if !token::has_kind(value, token::KIND_VIDEO) && !token::has_kind(value, token::KIND_STREAM) {
        return Ok(value.to_string());
    }
    let (_, payload) = token::decode(value)?;
    for key in ["v", "ident", "path", "url"] {
        if let Some(inner) = payload.get(key).and_then(Value::as_str) {
            if !inner.is_empty() {
                return Ok(inner.to_string());
            }
        }
    }
    Err(ProviderError::Decode(
        "Token payload has no resolvable value".to_string(),
    ))
}

/// Self-describing source payload a variant token round-trips through.
fn variant_source(candidate: &str, stream: &SccStream) -> Value {
    let mut source = json!({ "ident": candidate });
    if let Some(url) = &stream.url {
        source["url"] = json!(url);
    }
    if let Some(quality) = &stream.quality {
        source["quality"] = json!(quality);
    }
    if let Some(size) = stream.size {
        source["size"] = json!(size);
    }
    if let Some(language) = &stream.language {
        source["lang"] = json!(language);
    }
    source
}
