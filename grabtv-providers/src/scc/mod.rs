//! Stream Cinema Community (SCC) catalog upstream
//!
//! Reverse-engineered JSON menu/listing API. Everything it returns is
//! duck-typed; the types here decode tolerantly and the resolvers branch on
//! field presence.

pub mod client;
pub mod types;

pub use client::{normalize_path, SccClient};

/// Rate-limit bucket namespace for this upstream.
pub const PROVIDER: &str = "scc";
