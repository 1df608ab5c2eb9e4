//! Configuration for the retrieval engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::threshold::ThresholdPolicy;

/// Which chunking strategy the engine applies to incoming documents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Markdown-aware chunking for `md` documents, recursive for everything else.
    #[default]
    Auto,
    /// Paragraph → sentence → word splitting for every document.
    Recursive,
    /// Plain character windows.
    Fixed,
    /// Header-section chunking for every document.
    Markdown,
}

/// Configuration parameters for the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunker chosen for each document, by file type under `Auto`.
    pub chunking: ChunkingStrategy,
    /// Number of results returned when the caller does not ask for a count.
    pub top_k: usize,
    /// Minimum number of candidates fetched from the index before thresholding.
    pub oversample: usize,
    /// Policy applied when a query carries no explicit score threshold.
    pub threshold: ThresholdPolicy,
    /// Passages embedded per provider call during ingestion.
    pub embed_batch_size: usize,
    /// Upper bound on embedding calls in flight across the engine.
    pub max_concurrent_embeddings: usize,
    /// Hard timeout for a single embedding call, in milliseconds.
    pub embedding_timeout_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            chunking: ChunkingStrategy::Auto,
            top_k: 5,
            oversample: 20,
            threshold: ThresholdPolicy::default(),
            embed_batch_size: 16,
            max_concurrent_embeddings: 4,
            embedding_timeout_ms: 30_000,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The embedding timeout as a [`Duration`].
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_embeddings == 0 {
            return Err(RagError::ConfigError(
                "max_concurrent_embeddings must be greater than zero".to_string(),
            ));
        }
        if self.embedding_timeout_ms == 0 {
            return Err(RagError::ConfigError(
                "embedding_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.threshold.validate()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the chunking strategy.
    pub fn chunking(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.chunking = strategy;
        self
    }

    /// Set the default number of results per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum candidate count fetched before thresholding.
    pub fn oversample(mut self, oversample: usize) -> Self {
        self.config.oversample = oversample;
        self
    }

    /// Set the threshold policy used when a query has no explicit threshold.
    pub fn threshold(mut self, policy: ThresholdPolicy) -> Self {
        self.config.threshold = policy;
        self
    }

    /// Set how many passages are embedded per provider call.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the maximum number of concurrent embedding calls.
    pub fn max_concurrent_embeddings(mut self, n: usize) -> Self {
        self.config.max_concurrent_embeddings = n;
        self
    }

    /// Set the per-call embedding timeout.
    pub fn embedding_timeout(mut self, timeout: Duration) -> Self {
        self.config.embedding_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `embed_batch_size` or `max_concurrent_embeddings` is zero
    /// - the embedding timeout is zero
    /// - the threshold policy is out of range
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
