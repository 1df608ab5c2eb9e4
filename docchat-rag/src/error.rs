//! Error types for the `docchat-rag` crate.

use thiserror::Error;

/// Errors that can occur while ingesting, indexing, or querying documents.
#[derive(Debug, Error)]
pub enum RagError {
    /// Text could not be extracted from an uploaded file.
    ///
    /// Raised by the extraction collaborator; it is part of this taxonomy so
    /// that an upload fails as a distinct kind before anything is indexed.
    #[error("Extraction failed ({filename}): {message}")]
    ExtractionFailure {
        /// The file that could not be processed.
        filename: String,
        /// A description of the failure.
        message: String,
    },

    /// An embedding could not be produced.
    #[error("Embedding failed ({provider}): {message}")]
    EmbeddingFailure {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A chunk with the same id is already present in the index.
    #[error("Duplicate chunk id: {0}")]
    DuplicateChunk(String),

    /// A document with the same id has already been ingested.
    #[error("Document already indexed: {0}")]
    DuplicateDocument(String),

    /// A vector does not have the dimensionality the index was created with.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality of the index.
        expected: usize,
        /// Dimensionality of the rejected vector.
        actual: usize,
    },

    /// The document ↔ chunk invariant was violated by an insert or delete.
    #[error("Index inconsistency for document '{document_id}': {message}")]
    IndexInconsistency {
        /// The document whose chunk set is inconsistent.
        document_id: String,
        /// A description of the violation.
        message: String,
    },

    /// The answer-generation service could not be reached or failed.
    #[error("Generation unavailable ({provider}): {message}")]
    GenerationUnavailable {
        /// The generation backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A caller supplied an unusable argument.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The engine has been shut down and no longer accepts work.
    #[error("Retrieval engine has been shut down")]
    EngineShutdown,

    /// The document metadata store failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl RagError {
    /// Shorthand for an [`RagError::EmbeddingFailure`].
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingFailure { provider: provider.into(), message: message.into() }
    }

    /// Shorthand for a [`RagError::GenerationUnavailable`].
    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationUnavailable { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
