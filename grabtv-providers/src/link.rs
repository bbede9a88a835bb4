//! Download link resolution
//!
//! Composes the ident pipeline, the session manager, and the file host's
//! mint endpoint into one operation: opaque value in, concrete time-limited
//! download URL out.
//!
//! Retry discipline (hard bounds, never loops):
//! - an auth failure on the mint call gets exactly one replay with a freshly
//!   derived session
//! - an invalid-ident rejection gets exactly one recovery pass through the
//!   ident pipeline, then one retry mint with the alternate
//! - at most two mint HTTP calls per resolution, whichever branch is taken

use serde_json::json;

use crate::error::ProviderError;
use crate::ident::IdentResolver;
use crate::webshare::{self, SessionManager};
use grabtv_core::config::WebshareConfig;
use grabtv_core::ratelimit::{BurstPolicy, Decision, RateLimiter};

/// Opaque value -> download URL resolver.
///
/// Owns the per-request ident pipeline and session state; instance-scoped
/// like its parts.
pub struct DownloadLinkResolver {
    idents: IdentResolver,
    session: SessionManager,
    rate: RateLimiter,
    ws_config: WebshareConfig,
}

impl DownloadLinkResolver {
    pub fn new(
        idents: IdentResolver,
        session: SessionManager,
        rate: RateLimiter,
        ws_config: WebshareConfig,
    ) -> Self {
        Self {
            idents,
            session,
            rate,
            ws_config,
        }
    }

    /// The ident pipeline, for variant listing and queue draining.
    pub fn idents_mut(&mut self) -> &mut IdentResolver {
        &mut self.idents
    }

    /// The underlying session, for account info.
    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    /// Resolve an opaque value to a downloadable URL.
    ///
    /// Values that already resolve to a full URL pass through without
    /// touching the file host; everything else is minted.
    pub async fn resolve_url(&mut self, value: &str) -> Result<String, ProviderError> {
        let ident = self.idents.resolve(value).await?;
        if ident.starts_with("http://") || ident.starts_with("https://") {
            return Ok(ident);
        }

        self.acquire_mint_slot(&ident).await?;

        let err = match self.mint_once(&ident).await {
            Ok(link) => return Ok(link),
            Err(err) => err,
        };

        if err.is_auth_failure() {
            tracing::debug!("mint auth failure, replaying with fresh session: {err}");
            self.session.invalidate();
            return self.mint_once(&ident).await;
        }

        if err.is_invalid_ident() {
            match self.idents.recover(value, &ident).await {
                Ok(Some(alternate)) => {
                    return match self.mint_once(&alternate).await {
                        Ok(link) => Ok(link),
                        Err(retry_err) => {
                            tracing::debug!("recovered ident also rejected: {retry_err}");
                            // The first rejection names the ident the caller
                            // asked about.
                            Err(err)
                        }
                    };
                }
                Ok(None) => {}
                Err(recover_err) => {
                    tracing::debug!("ident recovery failed: {recover_err}");
                }
            }
        }

        Err(err)
    }

    async fn acquire_mint_slot(&self, ident: &str) -> Result<(), ProviderError> {
        let rate = &self.ws_config.rate;
        let burst = BurstPolicy::from_options(rate.burst_limit, rate.burst_window_seconds);
        let decision = self
            .rate
            .acquire(
                webshare::PROVIDER,
                "link",
                rate.min_spacing_seconds,
                json!({"ident": ident}),
                burst,
            )
            .await?;
        match decision {
            Decision::Granted => Ok(()),
            Decision::Denied {
                retry_after_seconds,
            } => Err(ProviderError::Deferred {
                retry_after_seconds,
            }),
        }
    }

    /// One mint HTTP call with whatever tokens the session currently yields.
    async fn mint_once(&mut self, ident: &str) -> Result<String, ProviderError> {
        let session_token = self.session.ensure_session().await?;
        let device_token = self.session.ensure_secondary_token().await?;
        let uuid = self.session.uuid().to_string();
        self.session
            .client()
            .file_link(ident, &session_token, &device_token, &uuid)
            .await
    }
}
