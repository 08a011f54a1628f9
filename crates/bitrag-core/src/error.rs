//! Error types shared across BitRAG crates.

use thiserror::Error;

/// Coarse classification of [`BitRagError`] used by callers to decide
/// whether a failure is retryable, a precondition, or a bug in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid embedder, provider or dimension settings.
    Configuration,
    /// A code or vector length does not match the collection dimension.
    DimensionMismatch,
    /// Nothing to ingest.
    EmptyInput,
    /// Embedding provider or storage backend unavailable or erroring.
    UpstreamFailure,
    /// Session or collection does not exist yet.
    NotFound,
    /// Malformed arguments (zero `k`, bad session id).
    InvalidInput,
    /// Local filesystem error.
    Io,
}

#[derive(Debug, Error)]
pub enum BitRagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API key missing for provider: {0}")]
    ApiKeyMissing(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upstream call timed out after {0}s")]
    Timeout(u64),

    #[error(
        "Ingest aborted after {committed_batches} committed batch(es) ({committed_items} items): {reason}"
    )]
    IngestAborted {
        committed_batches: usize,
        committed_items: usize,
        reason: String,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Session {0} has no indexed documents: process documents before querying")]
    NotIndexed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BitRagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::ApiKeyMissing(_) | Self::ProviderNotFound(_) => {
                ErrorKind::Configuration
            }
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::EmptyInput(_) => ErrorKind::EmptyInput,
            Self::Upstream(_)
            | Self::Http(_)
            | Self::Storage(_)
            | Self::Timeout(_)
            | Self::IngestAborted { .. } => ErrorKind::UpstreamFailure,
            Self::SessionNotFound(_) | Self::CollectionNotFound(_) | Self::NotIndexed(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::UpstreamFailure
    }
}

pub type Result<T> = std::result::Result<T, BitRagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            BitRagError::DimensionMismatch { expected: 8, actual: 16 }.kind(),
            ErrorKind::DimensionMismatch
        );
        assert_eq!(BitRagError::Timeout(5).kind(), ErrorKind::UpstreamFailure);
        assert_eq!(
            BitRagError::NotIndexed("s1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            BitRagError::ApiKeyMissing("openai".into()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_retryable_only_upstream() {
        assert!(BitRagError::Http("down".into()).is_retryable());
        assert!(!BitRagError::EmptyInput("nothing".into()).is_retryable());
    }

    #[test]
    fn test_not_indexed_message() {
        let msg = BitRagError::NotIndexed("abc".into()).to_string();
        assert!(msg.contains("process documents before querying"));
    }

    #[test]
    fn test_ingest_aborted_reports_prefix() {
        let err = BitRagError::IngestAborted {
            committed_batches: 2,
            committed_items: 1024,
            reason: "timeout".into(),
        };
        assert!(err.to_string().contains("2 committed batch(es) (1024 items)"));
    }
}
