//! Error types for the support RAG system

use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG system errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A vector does not have the dimension the index was configured with
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding and chunk sequences passed to a build differ in length
    #[error("Length mismatch: {vectors} embeddings for {chunks} chunks")]
    LengthMismatch { vectors: usize, chunks: usize },

    /// Persist was requested before the index was built
    #[error("Vector index has not been built")]
    IndexNotBuilt,

    /// Persisted artifacts exist but do not form a consistent pair
    #[error("Index artifacts are inconsistent: {0}")]
    IndexCorrupt(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Provider rejected the request because of a quota or rate limit
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Provider answered with a server-side failure (HTTP 5xx)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary artifact encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a provider call that failed with this error may succeed on retry.
    ///
    /// Configuration errors (including dimension mismatches) are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimited(_) | Error::Unavailable(_) => true,
            Error::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.status().map_or(true, |s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }

    /// Whether this error signals a setup defect rather than a runtime condition
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::DimensionMismatch { .. }
                | Error::LengthMismatch { .. }
                | Error::IndexNotBuilt
        )
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::RateLimited("429".into()).is_retryable());
        assert!(Error::Unavailable("503".into()).is_retryable());
        assert!(!Error::embedding("bad request").is_retryable());
        assert!(!Error::DimensionMismatch { expected: 768, actual: 3 }.is_retryable());
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::IndexNotBuilt.is_configuration());
        assert!(Error::LengthMismatch { vectors: 2, chunks: 3 }.is_configuration());
        assert!(!Error::IndexCorrupt("x".into()).is_configuration());
    }
}
