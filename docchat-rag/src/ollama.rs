//! Ollama embedding and answer-generation clients.
//!
//! This module is only available when the `ollama` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::AnswerGenerator;

const PROVIDER: &str = "Ollama";

/// The default Ollama host.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2:1b";

/// The default embedding model.
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";

/// The dimensionality of `nomic-embed-text`.
pub const DEFAULT_EMBED_DIMENSIONS: usize = 768;

/// Timeout for a single generation request.
pub const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);

fn endpoint(host: &str, path: &str) -> String {
    format!("{}/{path}", host.trim_end_matches('/'))
}

// ── Ollama API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Read an error body, preferring Ollama's `{"error": ...}` message.
async fn error_detail(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body)
}

/// An [`EmbeddingProvider`] backed by a local Ollama server.
///
/// Calls `POST {host}/api/embeddings` once per text.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434")
///     .with_model("nomic-embed-text", 768);
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    host: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for the default embedding model on `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            model: DEFAULT_EMBED_MODEL.into(),
            dimensions: DEFAULT_EMBED_DIMENSIONS,
        }
    }

    /// Use `model`, which produces vectors of `dimensions` components.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), model = %self.model, "embedding text");

        let response = self
            .client
            .post(endpoint(&self.host, "api/embeddings"))
            .json(&EmbeddingRequest { model: &self.model, prompt: text })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::embedding(PROVIDER, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            error!(provider = PROVIDER, %status, "API error");
            return Err(RagError::embedding(PROVIDER, format!("API returned {status}: {detail}")));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::embedding(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        if body.embedding.len() != self.dimensions {
            return Err(RagError::embedding(
                PROVIDER,
                format!(
                    "model '{}' returned {} dimensions, expected {}",
                    self.model,
                    body.embedding.len(),
                    self.dimensions
                ),
            ));
        }
        Ok(body.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        format!("ollama/{}", self.model)
    }
}

/// An [`AnswerGenerator`] calling Ollama's non-streaming `/api/generate`.
pub struct OllamaGenerator {
    client: reqwest::Client,
    host: String,
    model: String,
    timeout: Duration,
}

impl OllamaGenerator {
    /// Create a generator for the default chat model on `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            model: DEFAULT_CHAT_MODEL.into(),
            timeout: GENERATE_TIMEOUT,
        }
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.len(), "generating");

        let response = self
            .client
            .post(endpoint(&self.host, "api/generate"))
            .timeout(self.timeout)
            .json(&GenerateRequest { model: &self.model, prompt, stream: false })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::generation(PROVIDER, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            error!(provider = PROVIDER, %status, "API error");
            return Err(RagError::generation(PROVIDER, format!("API returned {status}: {detail}")));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::generation(PROVIDER, format!("failed to parse response: {e}"))
        })?;
        Ok(body.response.trim().to_string())
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
