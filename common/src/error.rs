//! Unified error taxonomy shared by every engine crate: one
//! `thiserror` enum, so call sites propagate with `?` end to end
//! instead of juggling a per-crate error type at every boundary.

use thiserror::Error;

pub type CResult<T> = Result<T, EngineError>;

/// One variant per error code. The `String` payload is always a
/// human-readable reason; structured context (job/table ids) is added
/// by the caller when it's known.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("transport error: {0}")]
    TransportError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::TransportError(_) => "TRANSPORT_ERROR",
            EngineError::DecodeError(_) => "DECODE_ERROR",
            EngineError::StorageError(_) => "STORAGE_ERROR",
            EngineError::ConfigError(_) => "CONFIG_ERROR",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Conflict(_) => "CONFLICT",
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        EngineError::TransportError(reason.into())
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        EngineError::DecodeError(reason.into())
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        EngineError::StorageError(reason.into())
    }

    pub fn config(reason: impl Into<String>) -> Self {
        EngineError::ConfigError(reason.into())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::TransportError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_taxonomy() {
        assert_eq!(EngineError::transport("x").code(), "TRANSPORT_ERROR");
        assert_eq!(EngineError::storage("x").code(), "STORAGE_ERROR");
        assert_eq!(EngineError::config("x").code(), "CONFIG_ERROR");
        assert_eq!(EngineError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(EngineError::Conflict("x".into()).code(), "CONFLICT");
    }
}
