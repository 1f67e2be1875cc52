//! Error types for the lifelog search engine

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the lifelog search system
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Recording source error: {0}")]
    Source(String),

    #[error("Duplicate recording id with divergent content: {0}")]
    DuplicateId(String),

    #[error("Recording not found: {0}")]
    NotFound(String),

    #[error("Corrupt artifact: {0}")]
    Corrupt(String),

    #[error("Embedding dimension mismatch: corpus declares {expected}, encoder produced {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation timed out")]
    Timeout,

    #[error("Reasoner unavailable")]
    ReasonerUnavailable,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Encoder error: {0}")]
    Encoder(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is recoverable (can retry with backoff)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Recoverable errors (can retry with backoff)
            Error::Storage(_)
            | Error::Source(_)
            | Error::Timeout
            | Error::Io(_)
            | Error::Encoder(_) => true,
            // Non-recoverable errors
            Error::DuplicateId(_)
            | Error::NotFound(_)
            | Error::Corrupt(_)
            | Error::DimensionMismatch { .. }
            | Error::Serialization(_)
            | Error::ReasonerUnavailable
            | Error::InvalidInput(_)
            | Error::InvalidState(_)
            | Error::Configuration(_) => false,
        }
    }

    /// Stable error code for user-visible failures
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::Storage(_) => "E_STORAGE",
            Error::Source(_) => "E_SOURCE",
            Error::DuplicateId(_) => "E_DUPLICATE_ID",
            Error::NotFound(_) => "E_NOT_FOUND",
            Error::Corrupt(_) => "E_CORRUPT",
            Error::DimensionMismatch { .. } => "E_DIMENSION_MISMATCH",
            Error::Serialization(_) => "E_SERIALIZATION",
            Error::Timeout => "E_TIMEOUT",
            Error::ReasonerUnavailable => "E_REASONER_UNAVAILABLE",
            Error::InvalidInput(_) => "E_INVALID_INPUT",
            Error::InvalidState(_) => "E_INVALID_STATE",
            Error::Io(_) => "E_IO",
            Error::Configuration(_) => "E_CONFIGURATION",
            Error::Encoder(_) => "E_ENCODER",
        }
    }
}
