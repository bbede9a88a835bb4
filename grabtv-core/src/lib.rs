// GrabTV Core
//
// Domain-neutral building blocks for the provider resolution subsystem:
// - config: layered configuration (file + environment)
// - error: core error taxonomy
// - logging: tracing bootstrap
// - models: normalized catalog item / download variant shapes
// - token: opaque token codec (kind-tagged base64url JSON payloads)
// - ratelimit: persisted per-(provider, bucket) spacing + burst windows
// - cache: unified key builder for the rate-limit store and the TTL cache

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod ratelimit;
pub mod token;

pub use cache::KeyBuilder;
pub use config::Config;
pub use error::{Error, Result};
