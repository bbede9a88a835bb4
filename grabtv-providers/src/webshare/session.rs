//! Session manager
//!
//! Owns the credential state for one Webshare provider configuration:
//! the primary session token (short-lived) and the derived device token
//! (longer-lived, independent expiry). Both are refreshed lazily, never
//! polled.
//!
//! All state is instance-scoped; two provider configurations never share a
//! session. Instances are meant for single-threaded, request-scoped use.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::client::{password_digest, WebshareClient};
use super::types::WsUserData;
use crate::error::ProviderError;
use grabtv_core::config::WebshareConfig;

/// Primary session lifetime observed upstream (~30 min, kept conservative).
const PRIMARY_TTL: Duration = Duration::from_secs(28 * 60);
/// Device token lifetime (~6 h upstream).
const SECONDARY_TTL: Duration = Duration::from_secs(6 * 60 * 60 - 5 * 60);

/// Error codes the login endpoint returns for transient conditions; worth
/// exactly one delayed retry before propagating.
const TRANSIENT_LOGIN_CODES: [&str; 2] = ["LOGIN_TRY_AGAIN", "503"];

const LOGIN_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    issued_at: Instant,
}

impl CachedToken {
    fn fresh(&self, ttl: Duration) -> bool {
        self.issued_at.elapsed() < ttl
    }
}

/// Per-provider credential/session state
pub struct SessionManager {
    client: Arc<WebshareClient>,
    username: String,
    password: String,
    locale: String,
    uuid: String,
    session: Option<CachedToken>,
    secondary: Option<CachedToken>,
    user_info: Option<WsUserData>,
}

impl SessionManager {
    /// Build from a decrypted provider config. Fails fast on missing
    /// credentials; this is never retried.
    pub fn new(client: Arc<WebshareClient>, config: &WebshareConfig) -> Result<Self, ProviderError> {
        if config.username.is_empty() || config.password.is_empty() {
            return Err(ProviderError::InvalidConfig(
                "Webshare username and password are required".to_string(),
            ));
        }
        let uuid = config
            .uuid
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            client,
            username: config.username.clone(),
            password: config.password.clone(),
            locale: config.locale.clone(),
            uuid,
            session: None,
            secondary: None,
            user_info: None,
        })
    }

    /// Stable per-installation client identifier. Persisting it back into the
    /// provider config is the caller's job.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    #[must_use]
    pub fn client(&self) -> &WebshareClient {
        &self.client
    }

    /// Return a valid primary session token, logging in if the cached one is
    /// missing or past its TTL.
    pub async fn ensure_session(&mut self) -> Result<String, ProviderError> {
        if let Some(session) = &self.session {
            if session.fresh(PRIMARY_TTL) {
                return Ok(session.value.clone());
            }
        }

        let token = match self.login_once().await {
            Ok(token) => token,
            Err(err) if is_transient_login_error(&err) => {
                tracing::debug!("transient login failure, retrying once: {err}");
                tokio::time::sleep(LOGIN_RETRY_DELAY).await;
                self.login_once().await?
            }
            Err(err) => return Err(err),
        };

        // New session invalidates everything derived from the old one.
        self.secondary = None;
        self.user_info = None;
        self.session = Some(CachedToken {
            value: token.clone(),
            issued_at: Instant::now(),
        });
        tracing::debug!("webshare session refreshed");
        Ok(token)
    }

    async fn login_once(&self) -> Result<String, ProviderError> {
        let salt = self.client.salt(&self.username).await?;
        let digest = password_digest(&self.password, &salt);
        self.client.login(&self.username, &digest, &self.uuid).await
    }

    /// Return a valid device token, deriving a fresh one from a (possibly
    /// refreshed) primary session when the cached one is stale.
    pub async fn ensure_secondary_token(&mut self) -> Result<String, ProviderError> {
        if let Some(secondary) = &self.secondary {
            if secondary.fresh(SECONDARY_TTL) {
                return Ok(secondary.value.clone());
            }
        }

        let session = self.ensure_session().await?;
        let token = self
            .client
            .device_token(&session, &self.uuid, &self.locale)
            .await?;
        self.secondary = Some(CachedToken {
            value: token.clone(),
            issued_at: Instant::now(),
        });
        Ok(token)
    }

    /// Account info for the current session, cached until the session rolls.
    pub async fn user_info(&mut self) -> Result<WsUserData, ProviderError> {
        if let Some(info) = &self.user_info {
            return Ok(info.clone());
        }
        let session = self.ensure_session().await?;
        let info = self.client.user_data(&session).await?;
        self.user_info = Some(info.clone());
        Ok(info)
    }

    /// Drop all cached tokens, forcing a full re-login on the next call.
    /// Used for the single replay after an auth failure on a secondary-token
    /// call.
    pub fn invalidate(&mut self) {
        self.session = None;
        self.secondary = None;
        self.user_info = None;
    }
}

fn is_transient_login_error(err: &ProviderError) -> bool {
    matches!(err, ProviderError::Api { code, .. }
        if TRANSIENT_LOGIN_CODES.iter().any(|c| c == code))
}
