//! Webshare file-host upstream
//!
//! Locker-style host: salted credential login, a derived device token for a
//! subset of endpoints, a flat search endpoint (the catalog fallback), and
//! the link-mint endpoint that turns an ident into a short-lived URL.

pub mod client;
pub mod session;
pub mod types;

pub use client::WebshareClient;
pub use session::SessionManager;

/// Rate-limit bucket namespace for this upstream.
pub const PROVIDER: &str = "webshare";
