//! Unified Key Builder
//!
//! All persisted keys (rate-limit windows, TTL-cache entries) are constructed
//! here so the layout stays consistent and debuggable across stores.
//!
//! - All keys use a configurable prefix (default: "grabtv")
//! - Consistent `{prefix}:{concern}:{...}` convention

/// Unified key builder for the rate-limit store and the external TTL cache.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    /// Create a new `KeyBuilder` with the given prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Create a `KeyBuilder` from configuration
    #[must_use]
    pub fn from_config(config: &crate::Config) -> Self {
        Self::new(config.cache.key_prefix.clone())
    }

    /// Rate-limit window for a (provider, bucket) pair
    ///
    /// Value: JSON-serialized `RateLimitWindow`
    #[must_use]
    pub fn ratelimit(&self, provider: &str, bucket: &str) -> String {
        format!("{}:ratelimit:{}:{}", self.prefix, provider, bucket)
    }

    /// Prefix matching all rate-limit windows of one provider
    #[must_use]
    pub fn ratelimit_provider(&self, provider: &str) -> String {
        format!("{}:ratelimit:{}:", self.prefix, provider)
    }

    /// Prefix matching all rate-limit windows
    #[must_use]
    pub fn ratelimit_all(&self) -> String {
        format!("{}:ratelimit:", self.prefix)
    }

    /// TTL-cache entry for a memoized catalog result
    ///
    /// `signature` identifies the provider configuration (so two differently
    /// configured instances of the same provider never share entries),
    /// `entry` the operation and its arguments (e.g. "search:matrix:20").
    #[must_use]
    pub fn catalog_entry(&self, provider: &str, signature: &str, entry: &str) -> String {
        format!("{}:catalog:{}:{}:{}", self.prefix, provider, signature, entry)
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new("grabtv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratelimit_key() {
        let keys = KeyBuilder::new("grabtv");
        assert_eq!(keys.ratelimit("scc", "search"), "grabtv:ratelimit:scc:search");
    }

    #[test]
    fn test_provider_prefix_matches_bucket_keys() {
        let keys = KeyBuilder::default();
        let key = keys.ratelimit("webshare", "link");
        assert!(key.starts_with(&keys.ratelimit_provider("webshare")));
        assert!(key.starts_with(&keys.ratelimit_all()));
    }

    #[test]
    fn test_catalog_entry_key() {
        let keys = KeyBuilder::new("g");
        assert_eq!(
            keys.catalog_entry("scc", "a1b2", "search:matrix:20"),
            "g:catalog:scc:a1b2:search:matrix:20"
        );
    }
}
