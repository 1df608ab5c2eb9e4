//! Data types for documents, chunks, index entries and search results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive fields of an ingested document.
///
/// A copy of this snapshot is stored with every index entry at ingest time so
/// retrieval results can be displayed without consulting the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    /// Original file name as uploaded.
    pub filename: String,
    /// Lower-cased file extension (`pdf`, `txt`, `md`, `docx`).
    pub file_type: String,
    /// Size of the uploaded file in bytes.
    pub size: u64,
    /// When the document was uploaded.
    pub upload_time: DateTime<Utc>,
    /// Number of whitespace-separated words in the extracted text.
    pub word_count: usize,
    /// Number of characters in the extracted text.
    pub char_count: usize,
}

/// A full document record as persisted by the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// Stable identifier for the document.
    pub id: String,
    /// Extracted full text.
    pub content: String,
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
}

impl DocumentRecord {
    /// Build a record from extracted text, deriving the word and character counts.
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        file_type: impl Into<String>,
        size: u64,
        content: impl Into<String>,
        upload_time: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        let metadata = DocumentMetadata {
            filename: filename.into(),
            file_type: file_type.into(),
            size,
            upload_time,
            word_count: content.split_whitespace().count(),
            char_count: content.chars().count(),
        };
        Self { id: id.into(), content, metadata }
    }

    /// The record without its content, for listings.
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary { id: self.id.clone(), metadata: self.metadata.clone() }
    }
}

/// A document record without its content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub id: String,
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
}

/// A passage produced by a [`Chunker`](crate::chunking::Chunker), before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    /// The passage text.
    pub text: String,
    /// Character offset of the passage start within the source text.
    pub offset: usize,
}

/// A segment of a document with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk (`{document_id}_{position}`).
    pub id: String,
    /// The ID of the parent document.
    pub document_id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Ordinal of the chunk within its document.
    pub position: usize,
    /// Character offset of the chunk within the document text.
    pub offset: usize,
    /// The vector embedding for this chunk's text.
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// The id given to the chunk at `position` of `document_id`.
    pub fn id_for(document_id: &str, position: usize) -> String {
        format!("{document_id}_{position}")
    }
}

/// The unit stored in a [`VectorIndex`](crate::vectorstore::VectorIndex).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    /// Document fields copied at ingest time.
    pub metadata: DocumentMetadata,
}

/// A retrieved passage with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub position: usize,
    pub offset: usize,
    pub metadata: DocumentMetadata,
    /// Cosine similarity between the query and the passage.
    pub score: f32,
    /// The similarity threshold that was applied to this query.
    pub threshold: f32,
}

impl SearchResult {
    pub(crate) fn from_entry(entry: &IndexEntry, score: f32, threshold: f32) -> Self {
        Self {
            chunk_id: entry.chunk.id.clone(),
            document_id: entry.chunk.document_id.clone(),
            text: entry.chunk.text.clone(),
            position: entry.chunk.position,
            offset: entry.chunk.offset,
            metadata: entry.metadata.clone(),
            score,
            threshold,
        }
    }
}

/// A document known to the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedDocument {
    pub document_id: String,
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
    /// Number of chunks stored for the document (zero for empty text).
    pub chunk_count: usize,
}

/// Introspection counters for the engine's collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionStats {
    /// Every ingested, non-deleted document, including those without chunks.
    pub document_count: usize,
    /// Documents with at least one chunk in the index.
    pub indexed_document_count: usize,
    /// Total chunk entries in the index.
    pub chunk_count: usize,
    /// Identifier of the embedding model used for every vector in the index.
    pub embedding_model: String,
    pub dimensions: usize,
}
