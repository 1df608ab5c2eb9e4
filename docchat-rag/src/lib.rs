//! Document ingestion and vector retrieval for docchat.
//!
//! This crate provides:
//! - Character-based chunking strategies (recursive, fixed-size, markdown)
//! - Embedding providers behind the [`EmbeddingProvider`] trait, with a
//!   bounded [`EmbeddingPool`]
//! - An in-memory cosine [`VectorIndex`]
//! - The [`RetrievalEngine`] tying ingestion, thresholded search and
//!   deletion together
//! - Prompt building and the [`AnswerGenerator`] seam for chat answers
//!
//! The `ollama` feature (enabled by default) adds HTTP clients for a local
//! Ollama server.

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod hashing;
pub mod inmemory;
pub mod locks;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod pool;
pub mod threshold;
pub mod vectorstore;

pub use chunking::{Chunker, FixedSizeChunker, MarkdownChunker, RecursiveChunker, chunk};
pub use config::{ChunkingStrategy, RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, CollectionStats, DocumentMetadata, DocumentRecord, DocumentSummary, IndexEntry,
    IndexedDocument, Passage, SearchResult,
};
pub use embedding::EmbeddingProvider;
pub use engine::{RetrievalEngine, RetrievalEngineBuilder};
pub use error::{RagError, Result};
pub use generation::{AnswerGenerator, DEFAULT_MAX_CONTEXT_CHARS, build_context, build_prompt};
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::InMemoryVectorIndex;
pub use locks::{DocumentGuard, DocumentLocks};
#[cfg(feature = "ollama")]
pub use ollama::{OllamaEmbeddingProvider, OllamaGenerator};
pub use pool::EmbeddingPool;
pub use threshold::ThresholdPolicy;
pub use vectorstore::{IndexStats, ScoredEntry, VectorIndex};
