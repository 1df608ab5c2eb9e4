//! Request and response bodies of the HTTP API.

use docchat_rag::{DocumentSummary, SearchResult};
use serde::{Deserialize, Serialize};

/// Answer returned by `/chat` when nothing has been uploaded yet.
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been uploaded yet. Please upload a document first.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub document: DocumentSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub n_results: Option<usize>,
    /// Static similarity threshold; omitted means the server's default policy.
    #[serde(default)]
    pub score_threshold: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub n_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub question: String,
    /// `None` when the generator could not be reached.
    pub answer: Option<String>,
    pub sources: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn answered(question: String, answer: String, sources: Vec<SearchResult>) -> Self {
        Self { question, answer: Some(answer), sources, degraded: false, error: None }
    }

    pub fn degraded(question: String, error: String, sources: Vec<SearchResult>) -> Self {
        Self { question, answer: None, sources, degraded: true, error: Some(error) }
    }
}
