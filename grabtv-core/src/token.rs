//! Opaque token codec
//!
//! Encodes small JSON payloads into URL-safe identifier strings prefixed by a
//! kind tag: `"<kind>.<base64url(json(payload))>"`, base64url without padding.
//!
//! Tokens are self-contained so callers never have to track server-side state
//! between listing an item and resolving its download. The codec itself is
//! content-agnostic: any map of JSON-safe values is a valid payload.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;

/// Kind tag for playable catalog items.
pub const KIND_VIDEO: &str = "video";
/// Kind tag for concrete download variants.
pub const KIND_STREAM: &str = "stream";

/// Opaque token decode error
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Token has no '.' separator")]
    MissingSeparator,

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

/// Encode a payload map under a kind tag.
pub fn encode(kind: &str, payload: &Map<String, Value>) -> String {
    // Map serialization cannot fail: keys are strings, values are JSON-safe.
    let json = Value::Object(payload.clone()).to_string();
    format!("{}.{}", kind, URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// Decode a token back into its kind tag and payload map.
pub fn decode(token: &str) -> Result<(String, Map<String, Value>), DecodeError> {
    let (kind, body) = token
        .split_once('.')
        .ok_or(DecodeError::MissingSeparator)?;
    let bytes = URL_SAFE_NO_PAD.decode(body.as_bytes())?;
    let value: Value = serde_json::from_slice(&bytes)?;
    match value {
        Value::Object(map) => Ok((kind.to_string(), map)),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Whether a caller-supplied value looks like an encoded token of the given kind.
#[must_use]
pub fn has_kind(value: &str, kind: &str) -> bool {
    value
        .split_once('.')
        .is_some_and(|(k, body)| k == kind && !body.is_empty())
}
