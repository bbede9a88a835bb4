//! Shared provider client error types
//!
//! Common error enum and utilities used by both upstream clients (SCC,
//! Webshare) and the resolvers built on top of them.

use serde_json::Value;
use thiserror::Error;

/// Maximum response body size for provider HTTP calls (16 MB).
/// Prevents OOM from malicious or misconfigured upstream servers.
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// How much upstream body is kept in error snippets.
const SNIPPET_LEN: usize = 256;

/// Common error type for the provider subsystem.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status} for {endpoint}: {snippet}")]
    Http {
        status: reqwest::StatusCode,
        endpoint: String,
        snippet: String,
    },

    #[error("API error (code {code}) for {endpoint}: {message}")]
    Api {
        code: String,
        message: String,
        endpoint: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Malformed token: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate-limit backpressure. Not a failure: interactive callers translate
    /// it into a "try again after N seconds" response, batch callers may
    /// sleep and retry.
    #[error("Deferred by rate limit. Try again in {retry_after_seconds}s")]
    Deferred { retry_after_seconds: u64 },

    #[error("Rate limit store error: {0}")]
    RateLimitStore(String),

    #[error("Response too large ({size} bytes, max {MAX_RESPONSE_SIZE})")]
    ResponseTooLarge { size: u64 },
}

impl ProviderError {
    /// Whether this is the file host's "invalid identifier" rejection,
    /// the one mint error class that triggers a single recovery attempt.
    #[must_use]
    pub fn is_invalid_ident(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == "FILE_IDENT_INVALID")
    }

    /// Whether a call authenticated with a secondary token failed auth and
    /// deserves exactly one replay with a freshly derived session.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Auth(_) => true,
            Self::Http { status, .. } => {
                *status == reqwest::StatusCode::UNAUTHORIZED
                    || *status == reqwest::StatusCode::FORBIDDEN
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for ProviderError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<grabtv_core::token::DecodeError> for ProviderError {
    fn from(err: grabtv_core::token::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<grabtv_core::ratelimit::RateLimitError> for ProviderError {
    fn from(err: grabtv_core::ratelimit::RateLimitError) -> Self {
        Self::RateLimitStore(err.to_string())
    }
}

/// Read a response body with size limit and deserialize as JSON.
///
/// Checks `Content-Length` hint first (if available), then enforces the
/// limit on the actual body bytes before deserializing.
pub async fn json_with_limit<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    if let Some(cl) = response.content_length() {
        if cl as usize > MAX_RESPONSE_SIZE {
            return Err(ProviderError::ResponseTooLarge { size: cl });
        }
    }
    let bytes = response.bytes().await?;
    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(ProviderError::ResponseTooLarge {
            size: bytes.len() as u64,
        });
    }
    serde_json::from_slice(&bytes).map_err(Into::into)
}

/// Check HTTP response status before processing the body.
///
/// On a non-2xx status, consumes the response and surfaces a typed error
/// carrying the endpoint, the status, and a bounded body snippet so callers
/// can branch on status without re-reading the wire.
pub async fn check_response(
    resp: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        let snippet = resp
            .text()
            .await
            .map(|body| truncate(&body, SNIPPET_LEN))
            .unwrap_or_default();
        return Err(ProviderError::Http {
            status,
            endpoint: endpoint.to_string(),
            snippet,
        });
    }
    Ok(resp)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Keys whose values are blanked before a request payload reaches a log line
/// or an error string.
const SECRET_KEYS: [&str; 5] = ["password", "digest", "token", "wst", "secret"];

/// Return a copy of a request payload with secret-bearing fields masked.
#[must_use]
pub fn mask_secrets(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let lower = k.to_lowercase();
                    if SECRET_KEYS.iter().any(|s| lower.contains(s)) {
                        (k.clone(), Value::String("***".to_string()))
                    } else {
                        (k.clone(), mask_secrets(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_secrets).collect()),
        other => other.clone(),
    }
}
