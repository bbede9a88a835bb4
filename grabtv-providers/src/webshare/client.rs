//! Webshare HTTP Client
//!
//! Pure HTTP client for the Webshare API. Stateless: tokens are passed in by
//! the `SessionManager`, which owns credential state.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::types::{
    WsDeviceTokenResp, WsFile, WsLoginResp, WsSaltResp, WsSearchResp, WsStatus, WsUserData,
};
use crate::error::{check_response, json_with_limit, mask_secrets, ProviderError};

const WS_USER_AGENT: &str = "GrabTV/0.1 (downloader; +https://github.com/grabtv)";

/// Link minting is latency-sensitive; everything else can wait longer.
const MINT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Bearer-like session token header
const X_WST: &str = "X-WST";
/// Stable per-installation client identifier header
const X_UUID: &str = "X-UUID";

/// Shared HTTP client for all Webshare requests (connection pooling).
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(DEFAULT_TIMEOUT)
        .pool_max_idle_per_host(10)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build Webshare shared HTTP client")
});

/// Hex sha256 of salt + password, the digest the login endpoint expects.
#[must_use]
pub fn password_digest(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Webshare HTTP client
pub struct WebshareClient {
    base_url: String,
    client: Client,
}

impl WebshareClient {
    /// Create a new Webshare client (reuses shared connection pool)
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

    fn build_headers(
        token: Option<&str>,
        uuid: Option<&str>,
    ) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(WS_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            headers.insert(X_WST, HeaderValue::from_str(token)?);
        }
        if let Some(uuid) = uuid {
            headers.insert(X_UUID, HeaderValue::from_str(uuid)?);
        }
        Ok(headers)
    }

    /// Map a non-OK envelope to a typed API error.
    fn check_status(status: &WsStatus, endpoint: &str) -> Result<(), ProviderError> {
        if status.is_ok() {
            return Ok(());
        }
        Err(ProviderError::Api {
            code: status.code.clone().unwrap_or_else(|| "FATAL".to_string()),
            message: status.message.clone().unwrap_or_default(),
            endpoint: endpoint.to_string(),
        })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
        token: Option<&str>,
        uuid: Option<&str>,
        timeout: Duration,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, endpoint);
        // Credentials and tokens never reach the log unmasked.
        let payload: Value = form
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect::<serde_json::Map<_, _>>()
            .into();
        tracing::trace!(endpoint, payload = %mask_secrets(&payload), "webshare call");

        let response = self
            .client
            .post(&url)
            .headers(Self::build_headers(token, uuid)?)
            .form(form)
            .timeout(timeout)
            .send()
            .await?;
        let response = check_response(response, endpoint).await?;
        json_with_limit(response).await
    }

    /// Fetch the per-user login salt.
    pub async fn salt(&self, username: &str) -> Result<String, ProviderError> {
        let endpoint = "/api/salt/";
        let resp: WsSaltResp = self
            .post_form(
                endpoint,
                &[("username_or_email", username)],
                None,
                None,
                DEFAULT_TIMEOUT,
            )
            .await?;
        Self::check_status(&resp.status, endpoint)?;
        resp.salt
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Parse("Missing salt in response".to_string()))
    }

    /// Log in with a pre-salted digest; returns the primary session token.
    pub async fn login(
        &self,
        username: &str,
        digest: &str,
        uuid: &str,
    ) -> Result<String, ProviderError> {
        let endpoint = "/api/login/";
        let resp: WsLoginResp = self
            .post_form(
                endpoint,
                &[
                    ("username_or_email", username),
                    ("password", digest),
                    ("keep_logged_in", "1"),
                ],
                None,
                Some(uuid),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Self::check_status(&resp.status, endpoint)?;
        resp.token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Parse("Missing token in login response".to_string()))
    }

    /// Exchange a primary session for the device token required by a subset
    /// of endpoints. Carries the stable client UUID and default locale and
    /// capability parameters.
    pub async fn device_token(
        &self,
        session_token: &str,
        uuid: &str,
        locale: &str,
    ) -> Result<String, ProviderError> {
        let endpoint = "/api/device_token/";
        let resp: WsDeviceTokenResp = self
            .post_form(
                endpoint,
                &[
                    ("uuid", uuid),
                    ("locale", locale),
                    ("capabilities", "download,search"),
                ],
                Some(session_token),
                Some(uuid),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Self::check_status(&resp.status, endpoint)?;
        resp.device_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Parse("Missing device token in response".to_string()))
    }

    /// Fetch account info for the current session.
    pub async fn user_data(&self, session_token: &str) -> Result<WsUserData, ProviderError> {
        let endpoint = "/api/user_data/";
        let resp: WsUserData = self
            .post_form(endpoint, &[], Some(session_token), None, DEFAULT_TIMEOUT)
            .await?;
        Self::check_status(&resp.status, endpoint)?;
        Ok(resp)
    }

    /// Flat file search; the secondary search upstream behind the catalog
    /// fallback.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        session_token: &str,
    ) -> Result<Vec<WsFile>, ProviderError> {
        let endpoint = "/api/search/";
        let limit = limit.to_string();
        let resp: WsSearchResp = self
            .post_form(
                endpoint,
                &[
                    ("what", query),
                    ("limit", limit.as_str()),
                    ("category", "video"),
                ],
                Some(session_token),
                None,
                DEFAULT_TIMEOUT,
            )
            .await?;
        Self::check_status(&resp.status, endpoint)?;
        Ok(resp.files)
    }

    /// Mint a (possibly short-lived) download link for an ident.
    ///
    /// The mint endpoint answers a JSON array on success; the first element
    /// must carry a non-empty `link` string. Anything else is a hard failure.
    /// An invalid ident is rejected with the structured `FILE_IDENT_INVALID`
    /// error code (a 2xx response with a FATAL envelope).
    pub async fn file_link(
        &self,
        ident: &str,
        session_token: &str,
        device_token: &str,
        uuid: &str,
    ) -> Result<String, ProviderError> {
        let endpoint = "/api/file_link/";
        let body: Value = self
            .post_form(
                endpoint,
                &[("ident", ident), ("device_token", device_token)],
                Some(session_token),
                Some(uuid),
                MINT_TIMEOUT,
            )
            .await?;

        // Structured rejection comes as an object envelope.
        if let Some(obj) = body.as_object() {
            let status: WsStatus =
                serde_json::from_value(Value::Object(obj.clone())).unwrap_or_default();
            Self::check_status(&status, endpoint)?;
            return Err(ProviderError::Parse(
                "Mint response is not an array".to_string(),
            ));
        }

        let items = body.as_array().ok_or_else(|| {
            ProviderError::Parse("Mint response is not an array".to_string())
        })?;
        items
            .first()
            .and_then(|item| item.get("link"))
            .and_then(Value::as_str)
            .filter(|link| !link.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| ProviderError::Parse("Missing link in mint response".to_string()))
    }
}
