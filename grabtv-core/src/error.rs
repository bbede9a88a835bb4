use thiserror::Error;

/// Failures the core crate itself produces: configuration loading, token
/// decoding and JSON (de)serialization. Upstream-facing failures live in the
/// providers crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<crate::token::DecodeError> for Error {
    fn from(err: crate::token::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_decode_error() {
        let err: Error = crate::token::DecodeError::MissingSeparator.into();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err: Error = config::ConfigError::Message("bad value".to_string()).into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("bad value"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
