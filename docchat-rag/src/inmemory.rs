//! In-memory vector index using cosine similarity.
//!
//! This module provides [`InMemoryVectorIndex`], a dependency-free vector
//! index backed by ordered maps protected by a `tokio::sync::RwLock`.
//! Searches share the read lock; inserts and deletes take the write lock, so
//! every mutation is observed atomically by concurrent searches.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::IndexEntry;
use crate::error::{RagError, Result};
use crate::vectorstore::{IndexStats, ScoredEntry, VectorIndex};

/// An entry together with its precomputed L2 norm.
#[derive(Debug)]
struct Stored {
    entry: Arc<IndexEntry>,
    norm: f32,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Insertion sequence number of the next entry.
    next_seq: u64,
    /// Entries keyed by insertion sequence, which doubles as the tie-breaker.
    entries: BTreeMap<u64, Stored>,
    by_chunk: HashMap<String, u64>,
    by_document: HashMap<String, BTreeSet<u64>>,
}

impl IndexState {
    fn remove_seq(&mut self, seq: u64) -> bool {
        let Some(stored) = self.entries.remove(&seq) else {
            return false;
        };
        let chunk = &stored.entry.chunk;
        self.by_chunk.remove(&chunk.id);
        if let Some(seqs) = self.by_document.get_mut(&chunk.document_id) {
            seqs.remove(&seq);
            if seqs.is_empty() {
                self.by_document.remove(&chunk.document_id);
            }
        }
        true
    }
}

/// An in-memory vector index using cosine similarity for search.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(384);
/// let hits = index.search(&query, 5).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    dimensions: usize,
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    /// Create a new empty index for vectors of `dimensions` components.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, state: RwLock::new(IndexState::default()) }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Compute cosine similarity from a dot product and the two norms.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

/// `(insertion sequence, score, entry)` for one search candidate.
type Candidate<'a> = (u64, f32, &'a Arc<IndexEntry>);

/// Descending score, then ascending insertion sequence.
fn rank(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0))
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn insert(&self, entry: IndexEntry) -> Result<()> {
        self.check_dimensions(&entry.chunk.embedding)?;

        let mut state = self.state.write().await;
        if state.by_chunk.contains_key(&entry.chunk.id) {
            return Err(RagError::DuplicateChunk(entry.chunk.id));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.by_chunk.insert(entry.chunk.id.clone(), seq);
        state.by_document.entry(entry.chunk.document_id.clone()).or_default().insert(seq);
        let norm = l2_norm(&entry.chunk.embedding);
        state.entries.insert(seq, Stored { entry: Arc::new(entry), norm });
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let Some(seqs) = state.by_document.remove(document_id) else {
            return Ok(0);
        };
        let mut removed = 0;
        for seq in seqs {
            if let Some(stored) = state.entries.remove(&seq) {
                state.by_chunk.remove(&stored.entry.chunk.id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut removed = 0;
        for id in chunk_ids {
            if let Some(seq) = state.by_chunk.get(id).copied() {
                if state.remove_seq(seq) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        self.check_dimensions(embedding)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(embedding);
        let state = self.state.read().await;
        let mut scored: Vec<Candidate<'_>> = state
            .entries
            .iter()
            .map(|(seq, stored)| {
                let score = cosine_similarity(
                    &stored.entry.chunk.embedding,
                    stored.norm,
                    embedding,
                    query_norm,
                );
                (*seq, score, &stored.entry)
            })
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k, rank);
            scored.truncate(k);
        }
        scored.sort_by(rank);

        Ok(scored
            .into_iter()
            .map(|(_, score, entry)| ScoredEntry { entry: Arc::clone(entry), score })
            .collect())
    }

    async fn contains_document(&self, document_id: &str) -> bool {
        self.state.read().await.by_document.contains_key(document_id)
    }

    async fn document_chunk_count(&self, document_id: &str) -> usize {
        self.state.read().await.by_document.get(document_id).map_or(0, BTreeSet::len)
    }

    async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        IndexStats { entry_count: state.entries.len(), document_count: state.by_document.len() }
    }

    async fn clear(&self) {
        *self.state.write().await = IndexState::default();
    }
}
