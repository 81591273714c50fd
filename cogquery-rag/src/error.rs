//! Error types for the `cogquery-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in retrieval operations.
///
/// Every failure kind is a separate variant so callers can choose between
/// retrying, reporting, or continuing degraded.
#[derive(Debug, Error)]
pub enum RagError {
    /// The retriever has no index yet: nothing was ingested or restored.
    #[error("Index not ready: ingest documents or load a saved index first")]
    NotReady,

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Reading or writing a persisted artifact failed for a reason other than absence.
    #[error("Persistence I/O error at {}: {source}", path.display())]
    PersistenceIo {
        /// The artifact path involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted artifact exists but cannot be decoded.
    #[error("Persisted index at {} is corrupt: {message}", path.display())]
    PersistenceCorrupt {
        /// The artifact path that failed to decode.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The persisted fragment index was built with a different embedding dimensionality.
    #[error(
        "Persisted index has {found}-dimensional embeddings but the provider produces \
         {expected}; rebuild the index"
    )]
    IncompatibleIndex {
        /// Dimensionality of the active embedding provider.
        expected: usize,
        /// Dimensionality recorded in the persisted artifact.
        found: usize,
    },
}

impl RagError {
    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingError { provider: provider.into(), message: message.into() }
    }

    /// Whether the caller can recover by supplying different input (ingesting
    /// first, fixing parameters) rather than treating this as a system fault.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotReady | Self::ConfigError(_))
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
