//! Retrieval engine orchestrator.
//!
//! The [`RetrievalEngine`] coordinates document ingestion
//! (chunk → embed → index) and query execution
//! (embed → search → threshold → dedupe) on top of an
//! [`EmbeddingProvider`] and a [`VectorIndex`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat_rag::{HashingEmbeddingProvider, RagConfig, RetrievalEngine};
//!
//! let engine = RetrievalEngine::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .build()?;
//!
//! engine.add_document("doc1", &text, metadata).await?;
//! let results = engine.search_documents("search query", 5, None).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, FixedSizeChunker, MarkdownChunker, RecursiveChunker};
use crate::config::{ChunkingStrategy, RagConfig};
use crate::document::{
    Chunk, CollectionStats, DocumentMetadata, IndexEntry, IndexedDocument, Passage, SearchResult,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorIndex;
use crate::locks::DocumentLocks;
use crate::pool::EmbeddingPool;
use crate::threshold::ThresholdPolicy;
use crate::vectorstore::VectorIndex;

#[derive(Debug, Clone)]
struct CatalogEntry {
    metadata: DocumentMetadata,
    chunk_count: usize,
}

/// The retrieval engine.
///
/// Owns the vector index and the catalog of ingested documents. Every
/// operation takes `&self`; share the engine between request handlers with
/// an `Arc`. Mutations of the same document id are serialised, searches run
/// concurrently with everything else. Construct one via
/// [`RetrievalEngine::builder()`].
pub struct RetrievalEngine {
    config: RagConfig,
    embedder: EmbeddingPool,
    index: Arc<dyn VectorIndex>,
    chunker: Option<Arc<dyn Chunker>>,
    catalog: RwLock<HashMap<String, CatalogEntry>>,
    locks: DocumentLocks,
    shut_down: AtomicBool,
}

impl RetrievalEngine {
    /// Create a new [`RetrievalEngineBuilder`].
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() { Err(RagError::EngineShutdown) } else { Ok(()) }
    }

    fn chunker_for(&self, file_type: &str) -> Arc<dyn Chunker> {
        if let Some(chunker) = &self.chunker {
            return Arc::clone(chunker);
        }
        let (size, overlap) = (self.config.chunk_size, self.config.chunk_overlap);
        match self.config.chunking {
            ChunkingStrategy::Auto if file_type.eq_ignore_ascii_case("md") => {
                Arc::new(MarkdownChunker::new(size, overlap))
            }
            ChunkingStrategy::Auto | ChunkingStrategy::Recursive => {
                Arc::new(RecursiveChunker::new(size, overlap))
            }
            ChunkingStrategy::Fixed => Arc::new(FixedSizeChunker::new(size, overlap)),
            ChunkingStrategy::Markdown => Arc::new(MarkdownChunker::new(size, overlap)),
        }
    }

    /// Ingest a document: chunk → embed → index.
    ///
    /// Returns the number of chunks stored. A document whose text yields no
    /// passages is still registered, with zero chunks.
    ///
    /// # Errors
    ///
    /// - [`RagError::DuplicateDocument`] if `document_id` was already ingested.
    /// - [`RagError::EmbeddingFailure`] or an index error if a passage could
    ///   not be embedded or stored. Every chunk written by this call has been
    ///   removed again by the time the error is returned.
    /// - [`RagError::IndexInconsistency`] if that cleanup left chunks behind.
    /// - [`RagError::EngineShutdown`] after [`shutdown`](Self::shutdown).
    pub async fn add_document(
        &self,
        document_id: &str,
        content: &str,
        metadata: DocumentMetadata,
    ) -> Result<usize> {
        if document_id.trim().is_empty() {
            return Err(RagError::InvalidInput("document id must not be empty".to_string()));
        }
        self.ensure_running()?;
        let _guard = self.locks.acquire(document_id).await;
        self.ensure_running()?;

        if self.catalog.read().await.contains_key(document_id)
            || self.index.contains_document(document_id).await
        {
            return Err(RagError::DuplicateDocument(document_id.to_string()));
        }

        let passages = self.chunker_for(&metadata.file_type).split(content);
        let mut inserted = Vec::with_capacity(passages.len());

        let indexed = self.index_passages(document_id, &passages, &metadata, &mut inserted).await;
        let outcome = match indexed {
            Ok(()) => self.register(document_id, metadata, passages.len()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            error!(document.id = %document_id, error = %e, "ingestion failed");
            self.roll_back(document_id, &inserted).await?;
            return Err(e);
        }

        info!(document.id = %document_id, chunk_count = passages.len(), "ingested document");
        Ok(passages.len())
    }

    async fn index_passages(
        &self,
        document_id: &str,
        passages: &[Passage],
        metadata: &DocumentMetadata,
        inserted: &mut Vec<String>,
    ) -> Result<()> {
        let batch_size = self.config.embed_batch_size;
        for (batch_no, batch) in passages.chunks(batch_size).enumerate() {
            self.ensure_running()?;
            let texts: Vec<&str> = batch.iter().map(|p| p.text.as_str()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;

            for (i, (passage, embedding)) in batch.iter().zip(embeddings).enumerate() {
                let position = batch_no * batch_size + i;
                let chunk = Chunk {
                    id: Chunk::id_for(document_id, position),
                    document_id: document_id.to_string(),
                    text: passage.text.clone(),
                    position,
                    offset: passage.offset,
                    embedding,
                };
                let chunk_id = chunk.id.clone();
                self.index.insert(IndexEntry { chunk, metadata: metadata.clone() }).await?;
                inserted.push(chunk_id);
            }
            debug!(document.id = %document_id, embedded = inserted.len(), "embedded batch");
        }
        Ok(())
    }

    async fn register(
        &self,
        document_id: &str,
        metadata: DocumentMetadata,
        chunk_count: usize,
    ) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        // Checked under the catalog lock so a concurrent shutdown cannot miss us.
        self.ensure_running()?;
        catalog.insert(document_id.to_string(), CatalogEntry { metadata, chunk_count });
        Ok(())
    }

    async fn roll_back(&self, document_id: &str, inserted: &[String]) -> Result<()> {
        if inserted.is_empty() {
            return Ok(());
        }
        let inconsistency = |message: String| {
            error!(document.id = %document_id, %message, "rollback left the index inconsistent");
            RagError::IndexInconsistency { document_id: document_id.to_string(), message }
        };

        let removed = self
            .index
            .delete_chunks(inserted)
            .await
            .map_err(|e| inconsistency(format!("rollback failed: {e}")))?;
        let remaining = self.index.document_chunk_count(document_id).await;
        if remaining > 0 {
            return Err(inconsistency(format!("{remaining} chunks remain after rollback")));
        }
        warn!(document.id = %document_id, removed, "rolled back partial ingestion");
        Ok(())
    }

    /// Query the index: embed → search → threshold → dedupe.
    ///
    /// `score_threshold` selects a static threshold for this query; `None`
    /// applies the configured default policy. Results are ordered by
    /// descending score and carry the threshold that was applied.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] for a blank query, `n_results == 0` or a
    ///   non-finite threshold.
    /// - [`RagError::EmbeddingFailure`] if the query cannot be embedded.
    pub async fn search_documents(
        &self,
        query: &str,
        n_results: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".to_string()));
        }
        if n_results == 0 {
            return Err(RagError::InvalidInput("n_results must be greater than zero".to_string()));
        }
        let policy = match score_threshold {
            Some(min_score) if !min_score.is_finite() => {
                return Err(RagError::InvalidInput(format!(
                    "score threshold must be finite, got {min_score}"
                )));
            }
            Some(min_score) => ThresholdPolicy::Static { min_score },
            None => self.config.threshold,
        };

        if self.index.stats().await.entry_count == 0 {
            debug!("search against empty index");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_query(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        let candidates =
            self.index.search(&query_embedding, n_results.max(self.config.oversample)).await?;
        let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
        let Some(cutoff) = policy.cutoff(&scores) else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let results: Vec<SearchResult> = candidates
            .iter()
            .filter(|c| c.score >= cutoff)
            .filter(|c| {
                let chunk = &c.entry.chunk;
                seen.insert((chunk.document_id.as_str(), chunk.text.as_str()))
            })
            .take(n_results)
            .map(|c| SearchResult::from_entry(&c.entry, c.score, cutoff))
            .collect();

        info!(
            candidate_count = candidates.len(),
            result_count = results.len(),
            threshold = cutoff,
            "query completed"
        );
        Ok(results)
    }

    /// Remove a document and all of its chunks.
    ///
    /// Returns whether anything was known about the document. Removing an
    /// unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexInconsistency`] if chunks of the document are
    /// still present afterwards.
    pub async fn remove_document(&self, document_id: &str) -> Result<bool> {
        let _guard = self.locks.acquire(document_id).await;

        let removed = self.index.delete_by_document(document_id).await?;
        if self.index.contains_document(document_id).await {
            error!(document.id = %document_id, "chunks remain after delete");
            return Err(RagError::IndexInconsistency {
                document_id: document_id.to_string(),
                message: "chunks remain after delete".to_string(),
            });
        }
        let known = self.catalog.write().await.remove(document_id).is_some();

        info!(document.id = %document_id, removed, known, "removed document");
        Ok(known || removed > 0)
    }

    /// Whether `document_id` has been ingested and not removed.
    pub async fn contains_document(&self, document_id: &str) -> bool {
        self.catalog.read().await.contains_key(document_id)
    }

    /// Every ingested document with its chunk count, newest upload first.
    pub async fn list_documents(&self) -> Vec<IndexedDocument> {
        let mut documents: Vec<IndexedDocument> = self
            .catalog
            .read()
            .await
            .iter()
            .map(|(id, entry)| IndexedDocument {
                document_id: id.clone(),
                metadata: entry.metadata.clone(),
                chunk_count: entry.chunk_count,
            })
            .collect();
        documents.sort_by(|a, b| {
            b.metadata
                .upload_time
                .cmp(&a.metadata.upload_time)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        documents
    }

    /// Document and chunk counters for the collection.
    pub async fn get_collection_stats(&self) -> CollectionStats {
        let document_count = self.catalog.read().await.len();
        let index = self.index.stats().await;
        CollectionStats {
            document_count,
            indexed_document_count: index.document_count,
            chunk_count: index.entry_count,
            embedding_model: self.embedder.model_id(),
            dimensions: self.embedder.dimensions(),
        }
    }

    /// Stop accepting documents and drop all indexed state.
    ///
    /// Later calls to [`add_document`](Self::add_document) fail with
    /// [`RagError::EngineShutdown`]; searches return no results.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut catalog = self.catalog.write().await;
        let document_count = catalog.len();
        catalog.clear();
        self.index.clear().await;
        info!(document_count, "retrieval engine shut down");
    }
}

/// Builder for constructing a [`RetrievalEngine`].
///
/// The embedding provider is required. Without an explicit index the engine
/// creates an [`InMemoryVectorIndex`] sized to the provider. Without an
/// explicit chunker it picks one per document from
/// [`RagConfig::chunking`](crate::RagConfig).
///
/// # Example
///
/// ```rust,ignore
/// let engine = RetrievalEngine::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_index(Arc::new(index))    // optional
///     .chunker(Arc::new(chunker))       // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RetrievalEngineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RetrievalEngineBuilder {
    /// Set the engine configuration. Defaults to [`RagConfig::default()`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector index backend.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Use `chunker` for every document regardless of its type.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RetrievalEngine`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedding provider is missing,
    /// the configuration is invalid, or the index dimensionality differs
    /// from the provider's.
    pub fn build(self) -> Result<RetrievalEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;

        let dimensions = provider.dimensions();
        let index = self
            .vector_index
            .unwrap_or_else(|| Arc::new(InMemoryVectorIndex::new(dimensions)));
        if index.dimensions() != dimensions {
            return Err(RagError::ConfigError(format!(
                "vector index has {} dimensions but embedding model '{}' produces {dimensions}",
                index.dimensions(),
                provider.model_id()
            )));
        }

        let embedder = EmbeddingPool::new(
            provider,
            config.max_concurrent_embeddings,
            config.embedding_timeout(),
        );
        Ok(RetrievalEngine {
            config,
            embedder,
            index,
            chunker: self.chunker,
            catalog: RwLock::new(HashMap::new()),
            locks: DocumentLocks::default(),
            shut_down: AtomicBool::new(false),
        })
    }
}
