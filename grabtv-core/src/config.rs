use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Key prefix for the rate-limit store and the external TTL cache
    pub key_prefix: String,
    /// TTL applied by the external cache wrapper to memoized catalog results
    pub catalog_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "grabtv".to_string(),
            catalog_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub scc: SccConfig,
    pub webshare: WebshareConfig,
}

/// Per-bucket rate-limit tunables for one provider.
///
/// `burst_limit` and `burst_window_seconds` must both be set for bursting to
/// take effect; a partial pair disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    pub min_spacing_seconds: u64,
    pub burst_limit: Option<u32>,
    pub burst_window_seconds: Option<u64>,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            min_spacing_seconds: 1,
            burst_limit: None,
            burst_window_seconds: None,
        }
    }
}

/// SCC catalog upstream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SccConfig {
    pub base_url: String,
    /// Preferred language for localized titles/plots
    pub preferred_language: String,
    /// Minimum interval between expensive detail fetches (per instance)
    pub detail_fetch_interval_seconds: u64,
    /// How many top movie-like search hits get best-effort variant enrichment
    pub search_enrich_limit: usize,
    pub rate: RateConfig,
}

impl Default for SccConfig {
    fn default() -> Self {
        Self {
            base_url: "https://plugin.sc2.zone".to_string(),
            preferred_language: "en".to_string(),
            detail_fetch_interval_seconds: 120,
            search_enrich_limit: 3,
            rate: RateConfig::default(),
        }
    }
}

/// Webshare file-host configuration
///
/// Credentials arrive already decrypted from the external credential store;
/// this crate never persists them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebshareConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Stable per-installation client identifier; generated when absent
    pub uuid: Option<String>,
    /// Locale sent with the device-token exchange
    pub locale: String,
    pub rate: RateConfig,
}

impl Default for WebshareConfig {
    fn default() -> Self {
        Self {
            base_url: "https://webshare.cz".to_string(),
            username: String::new(),
            password: String::new(),
            uuid: None,
            locale: "en".to_string(),
            rate: RateConfig {
                min_spacing_seconds: 2,
                burst_limit: None,
                burst_window_seconds: None,
            },
        }
    }
}

impl Config {
    /// Load configuration: defaults, then optional file, then `GRABTV_`
    /// environment overrides (e.g. `GRABTV_PROVIDERS__SCC__BASE_URL`).
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("GRABTV")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}
