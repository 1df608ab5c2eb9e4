//! Vector index trait for storing and searching chunk embeddings.

use std::sync::Arc;

use async_trait::async_trait;

use crate::document::IndexEntry;
use crate::error::Result;

/// An index entry returned by [`VectorIndex::search`] with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: Arc<IndexEntry>,
    /// Cosine similarity between the query and the entry's embedding.
    pub score: f32,
}

/// Entry and document counts of a [`VectorIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub entry_count: usize,
    pub document_count: usize,
}

/// A storage backend for chunk embeddings with cosine similarity search.
///
/// All vectors in one index have the same dimensionality. Every mutating
/// method is atomic from the caller's point of view: a concurrent
/// [`search`](VectorIndex::search) sees either all or none of its effect.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(384);
/// index.insert(entry).await?;
/// let hits = index.search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality of the vectors held by this index.
    fn dimensions(&self) -> usize;

    /// Add one entry.
    ///
    /// Fails with [`RagError::DuplicateChunk`](crate::RagError::DuplicateChunk)
    /// if the chunk id is already present and with
    /// [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch) if
    /// the embedding has the wrong length.
    async fn insert(&self, entry: IndexEntry) -> Result<()>;

    /// Remove every entry belonging to `document_id`, returning how many were removed.
    ///
    /// Removing a document with no entries is not an error.
    async fn delete_by_document(&self, document_id: &str) -> Result<usize>;

    /// Remove the entries with the given chunk ids, returning how many were removed.
    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<usize>;

    /// Return the `k` entries most similar to `embedding`, in descending order
    /// of similarity. Equal scores keep insertion order.
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredEntry>>;

    /// Whether any entry belongs to `document_id`.
    async fn contains_document(&self, document_id: &str) -> bool;

    /// Number of entries stored for `document_id`.
    async fn document_chunk_count(&self, document_id: &str) -> usize;

    /// Current entry and document counts.
    async fn stats(&self) -> IndexStats;

    /// Remove every entry.
    async fn clear(&self);
}
