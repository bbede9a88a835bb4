//! Persisted rate limiter
//!
//! Gates every upstream HTTP call by a (provider, bucket) pair: a minimum
//! spacing between calls, plus an optional rolling burst window. Windows are
//! persisted through a [`RateLimitStore`] so that concurrent processes (web
//! request path, background worker) never both observe a granted slot for the
//! same bucket in the same instant; the store must serialize the
//! read-modify-write under its own atomicity guarantee.
//!
//! Rate-limit deferral is an expected, common outcome, so it is represented as
//! a [`Decision`] value rather than an error.

use crate::cache::KeyBuilder;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Rate limiting error (store failures only; denials are [`Decision`]s)
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Rate limit store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persisted window state for one (provider, bucket) pair.
///
/// Created on first acquisition, overwritten on every subsequent attempt
/// (granted or denied), never deleted except by administrative clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub last_run_unix: u64,
    pub interval_seconds: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start_unix: Option<u64>,
    #[serde(default)]
    pub window_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_window_seconds: Option<u64>,

    /// Caller-supplied context (endpoint, query) for observability
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

/// Outcome of an acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied { retry_after_seconds: u64 },
}

impl Decision {
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    /// Seconds until the next attempt may succeed, if denied
    #[must_use]
    pub const fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Granted => None,
            Self::Denied {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
        }
    }
}

/// Rolling burst policy: at most `limit` grants per `window_seconds`.
///
/// Both fields are required together; a partially configured burst policy
/// disables bursting entirely (see [`BurstPolicy::from_options`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstPolicy {
    pub limit: u32,
    pub window_seconds: u64,
}

impl BurstPolicy {
    /// Build a policy from independently optional settings.
    /// Returns None unless both are present and non-zero.
    #[must_use]
    pub fn from_options(limit: Option<u32>, window_seconds: Option<u64>) -> Option<Self> {
        match (limit, window_seconds) {
            (Some(limit), Some(window_seconds)) if limit > 0 && window_seconds > 0 => {
                Some(Self {
                    limit,
                    window_seconds,
                })
            }
            _ => None,
        }
    }
}

/// Pure acquisition decision: given the stored window (if any) and the current
/// time, produce the new window to persist and the decision.
///
/// Deterministic in `now`, which keeps the timing properties unit-testable.
#[must_use]
pub fn evaluate(
    existing: Option<&RateLimitWindow>,
    now: u64,
    min_spacing_seconds: u64,
    burst: Option<BurstPolicy>,
    meta: &Value,
) -> (RateLimitWindow, Decision) {
    let mut window = existing.cloned().unwrap_or(RateLimitWindow {
        last_run_unix: 0,
        interval_seconds: min_spacing_seconds,
        window_start_unix: None,
        window_count: 0,
        burst_limit: None,
        burst_window_seconds: None,
        meta: Value::Null,
    });

    // Window is overwritten on every attempt; keep config fields current.
    window.interval_seconds = min_spacing_seconds;
    window.burst_limit = burst.map(|b| b.limit);
    window.burst_window_seconds = burst.map(|b| b.window_seconds);
    window.meta = meta.clone();

    // Minimum spacing between calls.
    if existing.is_some() {
        let elapsed = now.saturating_sub(window.last_run_unix);
        if elapsed < min_spacing_seconds {
            let retry_after_seconds = (min_spacing_seconds - elapsed).max(1);
            return (
                window,
                Decision::Denied {
                    retry_after_seconds,
                },
            );
        }
    }

    // Rolling burst window.
    if let Some(burst) = burst {
        let window_expired = window
            .window_start_unix
            .is_none_or(|start| now.saturating_sub(start) >= burst.window_seconds);

        if !window_expired && window.window_count >= burst.limit {
            // Remaining seconds in the rolling window (minimum 1).
            let start = window.window_start_unix.unwrap_or(now);
            let retry_after_seconds = (start + burst.window_seconds)
                .saturating_sub(now)
                .max(1);
            return (
                window,
                Decision::Denied {
                    retry_after_seconds,
                },
            );
        }

        if window_expired {
            window.window_start_unix = Some(now);
            window.window_count = 1;
        } else {
            window.window_count += 1;
        }
    } else {
        window.window_start_unix = None;
        window.window_count = 0;
    }

    window.last_run_unix = now;
    (window, Decision::Granted)
}

/// Seconds until the next acquisition against this window could succeed.
#[must_use]
pub fn retry_after_of(window: &RateLimitWindow, now: u64) -> u64 {
    let elapsed = now.saturating_sub(window.last_run_unix);
    let mut retry = window.interval_seconds.saturating_sub(elapsed);

    if let (Some(limit), Some(burst_window), Some(start)) = (
        window.burst_limit,
        window.burst_window_seconds,
        window.window_start_unix,
    ) {
        if window.window_count >= limit && now.saturating_sub(start) < burst_window {
            retry = retry.max((start + burst_window).saturating_sub(now));
        }
    }
    retry
}

/// Closure applied inside the store's atomic read-modify-write.
pub type ApplyFn = Box<dyn FnOnce(Option<RateLimitWindow>) -> (RateLimitWindow, Decision) + Send>;

/// Persistence boundary for rate-limit windows.
///
/// Any transactional KV or relational store suffices; `update` must apply the
/// closure atomically so two concurrent callers cannot both observe a grant
/// for the same slot.
#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically read-modify-write the window under `key`, persisting the
    /// returned window regardless of the decision.
    async fn update(&self, key: &str, apply: ApplyFn) -> Result<Decision, RateLimitError>;

    /// All windows whose key starts with `prefix`.
    async fn list(&self, prefix: &str)
        -> Result<Vec<(String, RateLimitWindow)>, RateLimitError>;

    /// Delete all windows whose key starts with `prefix`; returns the count.
    async fn remove(&self, prefix: &str) -> Result<u64, RateLimitError>;

    /// Delete the window stored under exactly `key`; returns 1 if it existed.
    async fn delete(&self, key: &str) -> Result<u64, RateLimitError>;
}

/// In-memory store. Atomicity comes from holding the mutex across the whole
/// read-modify-write. Suitable for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    windows: Mutex<HashMap<String, RateLimitWindow>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RateLimitStore for MemoryStore {
    async fn update(&self, key: &str, apply: ApplyFn) -> Result<Decision, RateLimitError> {
        let mut windows = self.windows.lock();
        let existing = windows.get(key).cloned();
        let (window, decision) = apply(existing);
        windows.insert(key.to_string(), window);
        Ok(decision)
    }

    async fn list(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, RateLimitWindow)>, RateLimitError> {
        let windows = self.windows.lock();
        let mut entries: Vec<_> = windows
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, w)| (k.clone(), w.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn remove(&self, prefix: &str) -> Result<u64, RateLimitError> {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|k, _| !k.starts_with(prefix));
        Ok((before - windows.len()) as u64)
    }

    async fn delete(&self, key: &str) -> Result<u64, RateLimitError> {
        Ok(u64::from(self.windows.lock().remove(key).is_some()))
    }
}

/// One window with its derived retry-after, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct WindowStatus {
    pub key: String,
    pub retry_after_seconds: u64,
    pub window: RateLimitWindow,
}

/// Persisted token-bucket-like gate over a [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    keys: KeyBuilder,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, keys: KeyBuilder) -> Self {
        Self { store, keys }
    }

    /// In-memory limiter (per-process only), for tests and single-node use.
    #[must_use]
    pub fn in_memory(keys: KeyBuilder) -> Self {
        Self::new(Arc::new(MemoryStore::new()), keys)
    }

    /// Attempt to acquire a call slot for (provider, bucket).
    pub async fn acquire(
        &self,
        provider: &str,
        bucket: &str,
        min_spacing_seconds: u64,
        meta: Value,
        burst: Option<BurstPolicy>,
    ) -> Result<Decision, RateLimitError> {
        let key = self.keys.ratelimit(provider, bucket);
        let now = unix_now();
        let decision = self
            .store
            .update(
                &key,
                Box::new(move |existing| {
                    evaluate(existing.as_ref(), now, min_spacing_seconds, burst, &meta)
                }),
            )
            .await?;

        if let Decision::Denied {
            retry_after_seconds,
        } = decision
        {
            tracing::debug!(
                provider,
                bucket,
                retry_after_seconds,
                "rate limit denied slot"
            );
        }
        Ok(decision)
    }

    /// All windows (optionally scoped to one provider) with derived retry-after.
    pub async fn inspect(
        &self,
        provider: Option<&str>,
    ) -> Result<Vec<WindowStatus>, RateLimitError> {
        let prefix = match provider {
            Some(p) => self.keys.ratelimit_provider(p),
            None => self.keys.ratelimit_all(),
        };
        let now = unix_now();
        let entries = self.store.list(&prefix).await?;
        Ok(entries
            .into_iter()
            .map(|(key, window)| WindowStatus {
                retry_after_seconds: retry_after_of(&window, now),
                key,
                window,
            })
            .collect())
    }

    /// Administrative clear of one bucket (exact key) or all buckets of a
    /// provider (prefix).
    pub async fn clear(
        &self,
        provider: &str,
        bucket: Option<&str>,
    ) -> Result<u64, RateLimitError> {
        match bucket {
            Some(b) => self.store.delete(&self.keys.ratelimit(provider, b)).await,
            None => {
                self.store
                    .remove(&self.keys.ratelimit_provider(provider))
                    .await
            }
        }
    }
}

/// Current unix time in seconds. Returns 0 if system time is before the epoch
/// (should never happen in practice).
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
