//! SCC HTTP Client
//!
//! Pure HTTP client for the SCC catalog API; no resolver logic lives here.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;

use super::types::{SccEntry, SccListing};
use crate::error::{check_response, json_with_limit, ProviderError};

const SCC_USER_AGENT: &str = "GrabTV/0.1 (catalog; +https://github.com/grabtv)";

/// Listing/search calls are cheap upstream; detail fetches are not.
const LISTING_TIMEOUT: Duration = Duration::from_secs(15);
const DETAIL_TIMEOUT: Duration = Duration::from_secs(40);

/// Shared HTTP client for all SCC requests (connection pooling).
/// Redirects are disabled so a compromised upstream cannot bounce requests
/// to private addresses.
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(LISTING_TIMEOUT)
        .pool_max_idle_per_host(10)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build SCC shared HTTP client")
});

/// Convert a listing URL into a normalized browse path: scheme and host are
/// dropped, path and query are kept, a leading `/` is guaranteed.
#[must_use]
pub fn normalize_path(url_or_path: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url_or_path) {
        if parsed.scheme() == "http" || parsed.scheme() == "https" {
            return match parsed.query() {
                Some(q) => format!("{}?{}", parsed.path(), q),
                None => parsed.path().to_string(),
            };
        }
    }
    if url_or_path.starts_with('/') {
        url_or_path.to_string()
    } else {
        format!("/{url_or_path}")
    }
}

/// SCC catalog client
///
/// Provides the raw endpoints the resolvers compose:
/// - search (general / type-scoped / cast)
/// - browse (hierarchical menus)
/// - detail (expensive; carries stream descriptors)
/// - stream-url resolution (source catalog's on-demand ident reveal)
pub struct SccClient {
    base_url: String,
    client: Client,
}

impl SccClient {
    /// Create a new SCC client (reuses shared connection pool)
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: SHARED_CLIENT.clone(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_headers() -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(SCC_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn get_listing(&self, endpoint: &str, url: &str) -> Result<SccListing, ProviderError> {
        let response = self
            .client
            .get(url)
            .headers(Self::build_headers()?)
            .timeout(LISTING_TIMEOUT)
            .send()
            .await?;
        let response = check_response(response, endpoint).await?;
        json_with_limit(response).await
    }

    /// General or type-scoped search.
    ///
    /// # Arguments
    /// * `query` - free-text query
    /// * `media_type` - optional type scope (e.g. "movie", "tvshow")
    /// * `limit` - page size hint passed upstream
    pub async fn search(
        &self,
        query: &str,
        media_type: Option<&str>,
        limit: usize,
    ) -> Result<SccListing, ProviderError> {
        let endpoint = "/api/media/filter/search";
        let mut url = url::Url::parse(&format!("{}{}", self.base_url, endpoint))
            .map_err(|e| ProviderError::InvalidConfig(format!("Bad SCC base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("value", query)
            .append_pair("limit", &limit.to_string());
        if let Some(t) = media_type {
            url.query_pairs_mut().append_pair("type", t);
        }
        self.get_listing(endpoint, url.as_str()).await
    }

    /// People/cast search. Only called for sufficiently long queries; the
    /// upstream treats short values as prefix wildcards and floods results.
    pub async fn search_cast(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<SccListing, ProviderError> {
        let endpoint = "/api/media/filter/cast";
        let mut url = url::Url::parse(&format!("{}{}", self.base_url, endpoint))
            .map_err(|e| ProviderError::InvalidConfig(format!("Bad SCC base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("value", query)
            .append_pair("limit", &limit.to_string());
        self.get_listing(endpoint, url.as_str()).await
    }

    /// Fetch one level of the browse hierarchy.
    pub async fn browse(&self, path: &str) -> Result<SccListing, ProviderError> {
        let path = normalize_path(path);
        let url = format!("{}{}", self.base_url, path);
        self.get_listing(&path, &url).await
    }

    /// Fetch the detail of one entry, including its stream descriptors.
    ///
    /// Expensive and heavily rate-limited upstream; callers throttle this
    /// through the ident-fetch interval, not just the generic rate limiter.
    pub async fn detail(&self, path: &str) -> Result<SccEntry, ProviderError> {
        let path = normalize_path(path);
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .headers(Self::build_headers()?)
            .timeout(DETAIL_TIMEOUT)
            .send()
            .await?;
        let response = check_response(response, &path).await?;
        json_with_limit(response).await
    }

    /// Ask a source catalog to resolve its own canonical ident for a stream
    /// it previously described with a numeric placeholder.
    ///
    /// Always fetched fresh: the revealed ident can be short-lived.
    pub async fn resolve_stream_url(&self, stream_url: &str) -> Result<Option<String>, ProviderError> {
        #[derive(Deserialize)]
        struct StreamUrlResp {
            #[serde(default)]
            ident: Option<String>,
        }

        let url = if stream_url.starts_with("http://") || stream_url.starts_with("https://") {
            stream_url.to_string()
        } else {
            format!("{}{}", self.base_url, normalize_path(stream_url))
        };

        let response = self
            .client
            .get(&url)
            .headers(Self::build_headers()?)
            .timeout(DETAIL_TIMEOUT)
            .send()
            .await?;
        let response = check_response(response, stream_url).await?;
        let resp: StreamUrlResp = json_with_limit(response).await?;
        Ok(resp.ident.filter(|i| !i.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = SccClient::new("https://scc.example.com/");
        assert_eq!(client.base_url(), "https://scc.example.com");
    }

    #[test]
    fn test_normalize_path_from_url() {
        assert_eq!(
            normalize_path("https://scc.example.com/Search/foo?page=2"),
            "/Search/foo?page=2"
        );
        assert_eq!(normalize_path("https://scc.example.com/Play/42"), "/Play/42");
    }

    #[test]
    fn test_normalize_path_passthrough_and_leading_slash() {
        assert_eq!(normalize_path("/Play/42"), "/Play/42");
        assert_eq!(normalize_path("Play/42"), "/Play/42");
    }

    #[test]
    fn test_normalize_path_ignores_non_http_schemes() {
        // "plugin:" parses as a URL scheme but is not an http(s) listing URL
        assert_eq!(normalize_path("/a?b=c"), "/a?b=c");
    }
}
