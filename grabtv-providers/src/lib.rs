// GrabTV Provider Clients
//
// Upstream HTTP clients and the resolution subsystem that turns opaque user
// queries and externally issued identifiers into normalized catalog items and
// concrete, time-limited download URLs.
//
// Architecture:
// - scc:      Stream Cinema Community catalog client (hierarchical JSON menus)
// - webshare: file-host client (salted login, device token, flat search,
//             link minting) and the SessionManager built on it
// - catalog:  CatalogResolver - search/browse normalization + enrichment
// - ident:    IdentResolver - opaque identifier -> file-host ident pipeline
// - link:     DownloadLinkResolver - ident -> download URL, with one-shot
//             recovery on ident rejection
//
// Every upstream call goes through the persisted RateLimiter from grabtv-core;
// a denied slot surfaces as ProviderError::Deferred, never as a blocking wait.

pub mod catalog;
pub mod error;
pub mod ident;
pub mod link;
pub mod scc;
pub mod webshare;

pub use catalog::CatalogResolver;
pub use error::ProviderError;
pub use ident::IdentResolver;
pub use link::DownloadLinkResolver;
pub use scc::SccClient;
pub use webshare::{SessionManager, WebshareClient};

/// Whether an ident candidate looks like an upstream's numeric display id
/// rather than a real content ident (non-empty, ASCII digits only).
///
/// Numeric display ids are not valid file-host identifiers and must be
/// resolved further; they are kept only as last-resort fallbacks.
#[must_use]
pub fn is_numeric_ident(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_ident() {
        assert!(is_numeric_ident("42"));
        assert!(is_numeric_ident("0012345"));
        assert!(!is_numeric_ident(""));
        assert!(!is_numeric_ident("abc123"));
        assert!(!is_numeric_ident("12.5"));
        assert!(!is_numeric_ident("12a"));
    }
}
