//! Local feature-hashing embedding provider.
//!
//! [`HashingEmbeddingProvider`] needs no model download or network access:
//! each text is tokenised into lower-cased alphanumeric words, word unigrams
//! and adjacent bigrams are hashed into a fixed number of signed buckets, term
//! frequencies are damped logarithmically, and the result is L2-normalised.
//! Text without any alphanumeric word (rules, emoji, symbols) falls back to
//! its whitespace-separated runs, so every non-blank input embeds.
//! Texts that share vocabulary end up with high cosine similarity, which is
//! enough for keyword-heavy document search and makes tests reproducible.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "hashing";

/// Default dimensionality of hashed embeddings.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Default maximum input length in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 32_768;

const BIGRAM_WEIGHT: f32 = 0.5;

/// A deterministic, CPU-only [`EmbeddingProvider`] based on feature hashing.
///
/// Embedding work runs on tokio's blocking thread pool so it never stalls
/// the async workers serving other requests.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::{EmbeddingProvider, HashingEmbeddingProvider};
///
/// let provider = HashingEmbeddingProvider::new(256);
/// let a = provider.embed("capital of France").await?;
/// let b = provider.embed("France capital city").await?;
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
    max_input_chars: usize,
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbeddingProvider {
    /// Create a provider producing `dimensions`-component vectors (at least 1).
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1), max_input_chars: DEFAULT_MAX_INPUT_CHARS }
    }

    /// Reject inputs longer than `max_chars` characters.
    pub fn with_max_input_chars(mut self, max_chars: usize) -> Self {
        self.max_input_chars = max_chars;
        self
    }

    /// Embed synchronously on the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingFailure`] if the text is longer than the
    /// input limit or is blank.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let char_count = text.chars().count();
        if char_count > self.max_input_chars {
            return Err(RagError::embedding(
                PROVIDER,
                format!(
                    "input of {char_count} characters exceeds limit of {}",
                    self.max_input_chars
                ),
            ));
        }

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(RagError::embedding(PROVIDER, "input is blank"));
        }

        // Keyed by feature hash so accumulation order never depends on map iteration.
        let mut features: BTreeMap<u64, (f32, u32)> = BTreeMap::new();
        for token in &tokens {
            let entry = features.entry(feature_hash(b'u', &[token.as_str()])).or_insert((1.0, 0));
            entry.1 += 1;
        }
        for pair in tokens.windows(2) {
            let hash = feature_hash(b'b', &[pair[0].as_str(), pair[1].as_str()]);
            let entry = features.entry(hash).or_insert((BIGRAM_WEIGHT, 0));
            entry.1 += 1;
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for (hash, (weight, count)) in features {
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign * weight * (1.0 + (count as f32).ln());
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(RagError::embedding(PROVIDER, "hashed features cancelled out"));
        }
        vector.iter_mut().for_each(|x| *x /= norm);
        Ok(vector)
    }
}

/// Lower-cased runs of alphanumeric characters, or the whitespace-separated
/// runs of `text` when it has none.
fn tokenize(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    if !words.is_empty() {
        return words;
    }
    text.split_whitespace().map(str::to_string).collect()
}

/// FNV-1a over the feature kind and its tokens, finished with a splitmix64 mix.
fn feature_hash(kind: u8, tokens: &[&str]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    let mut feed = |byte: u8| {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    };
    feed(kind);
    for token in tokens {
        token.bytes().for_each(&mut feed);
        feed(0x1f);
    }

    let mut z = hash.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text]).await?;
        results.pop().ok_or_else(|| RagError::embedding(PROVIDER, "empty batch result"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let provider = self.clone();
        let owned: Vec<String> = texts.iter().map(|t| (*t).to_string()).collect();
        tokio::task::spawn_blocking(move || {
            owned.iter().map(|text| provider.embed_sync(text)).collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| RagError::embedding(PROVIDER, format!("embedding worker failed: {e}")))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        format!("{PROVIDER}-{}", self.dimensions)
    }
}
