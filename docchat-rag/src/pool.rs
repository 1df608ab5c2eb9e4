//! Bounded, time-limited access to an embedding provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Wraps an [`EmbeddingProvider`] with a concurrency limit and a hard timeout.
///
/// Every call holds one semaphore permit for its whole duration, so at most
/// `max_concurrent` embedding calls run at once no matter how many requests
/// are being served. A call that exceeds the timeout fails with
/// [`RagError::EmbeddingFailure`].
pub struct EmbeddingPool {
    provider: Arc<dyn EmbeddingProvider>,
    semaphore: Semaphore,
    max_concurrent: usize,
    timeout: Duration,
}

impl EmbeddingPool {
    /// Create a new pool around `provider`.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self { provider, semaphore: Semaphore::new(max_concurrent), max_concurrent, timeout }
    }

    /// The embedding dimension of the wrapped provider.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// The model id of the wrapped provider.
    pub fn model_id(&self) -> String {
        self.provider.model_id()
    }

    /// Embed a batch of passages.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingFailure`] if the provider fails, times out,
    /// returns the wrong number of vectors, or returns a vector of the wrong
    /// dimension.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let _permit = self.acquire().await?;

        let vectors = tokio::time::timeout(self.timeout, self.provider.embed_batch(texts))
            .await
            .map_err(|_| self.timed_out())??;

        if vectors.len() != texts.len() {
            return Err(RagError::embedding(
                self.provider.model_id(),
                format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            ));
        }
        for vector in &vectors {
            self.check_dimensions(vector)?;
        }
        Ok(vectors)
    }

    /// Embed a single query.
    ///
    /// # Errors
    ///
    /// Same as [`embed_batch`](Self::embed_batch).
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let _permit = self.acquire().await?;

        let vector = tokio::time::timeout(self.timeout, self.provider.embed(query))
            .await
            .map_err(|_| self.timed_out())??;
        self.check_dimensions(&vector)?;
        Ok(vector)
    }

    /// Number of permits currently available.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Maximum number of concurrent embedding calls.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.semaphore.acquire().await.map_err(|e| {
            RagError::embedding(self.provider.model_id(), format!("semaphore error: {e}"))
        })
    }

    fn timed_out(&self) -> RagError {
        warn!(
            model = %self.provider.model_id(),
            timeout_ms = self.timeout.as_millis() as u64,
            "embedding call timed out"
        );
        RagError::embedding(
            self.provider.model_id(),
            format!("embedding call exceeded {} ms", self.timeout.as_millis()),
        )
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        let expected = self.provider.dimensions();
        if vector.len() != expected {
            return Err(RagError::embedding(
                self.provider.model_id(),
                format!("expected {expected} dimensions, got {}", vector.len()),
            ));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::embedding(
                self.provider.model_id(),
                "embedding contains non-finite values",
            ));
        }
        Ok(())
    }
}
