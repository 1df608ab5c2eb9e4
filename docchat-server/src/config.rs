//! Server configuration from command-line flags and environment variables.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use docchat_rag::ollama::{
    DEFAULT_CHAT_MODEL, DEFAULT_EMBED_DIMENSIONS, DEFAULT_EMBED_MODEL, DEFAULT_HOST,
};
use docchat_rag::{
    AnswerGenerator, EmbeddingProvider, HashingEmbeddingProvider, OllamaEmbeddingProvider,
    OllamaGenerator, RagConfig, hashing,
};

/// Which embedding backend indexes documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Local feature-hashing embedder; needs no model server.
    #[default]
    Hashing,
    /// Ollama's `/api/embeddings` endpoint.
    Ollama,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Parser)]
#[command(name = "docchat")]
#[command(about = "Upload documents and ask questions about them")]
#[command(version)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "DOCCHAT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "DOCCHAT_PORT", default_value_t = 8004)]
    pub port: u16,

    /// Directory holding uploaded files and processed document records
    #[arg(long, env = "DOCCHAT_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Base URL of the Ollama server
    #[arg(long, env = "OLLAMA_HOST", default_value = DEFAULT_HOST)]
    pub ollama_host: String,

    /// Model answering chat questions
    #[arg(long, env = "DOCCHAT_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    /// Embedding backend
    #[arg(long, env = "DOCCHAT_EMBEDDER", value_enum, default_value_t)]
    pub embedder: EmbedderKind,

    /// Ollama embedding model (with `--embedder ollama`)
    #[arg(long, env = "DOCCHAT_EMBED_MODEL", default_value = DEFAULT_EMBED_MODEL)]
    pub embed_model: String,

    /// Embedding dimensionality (defaults to the backend's native size)
    #[arg(long, env = "DOCCHAT_EMBED_DIMENSIONS")]
    pub embed_dimensions: Option<usize>,

    /// Maximum chunk size in characters
    #[arg(long, env = "DOCCHAT_CHUNK_SIZE", default_value_t = 800)]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, env = "DOCCHAT_CHUNK_OVERLAP", default_value_t = 100)]
    pub chunk_overlap: usize,

    /// Largest accepted upload, in megabytes
    #[arg(long, env = "DOCCHAT_MAX_UPLOAD_MB", default_value_t = 50)]
    pub max_upload_mb: usize,

    /// Log output format
    #[arg(long, env = "DOCCHAT_LOG_FORMAT", value_enum, default_value_t)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8004,
            data_dir: PathBuf::from("data"),
            ollama_host: DEFAULT_HOST.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedder: EmbedderKind::default(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            embed_dimensions: None,
            chunk_size: 800,
            chunk_overlap: 100,
            max_upload_mb: 50,
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Engine configuration with this server's chunking parameters.
    pub fn rag_config(&self) -> docchat_rag::Result<RagConfig> {
        RagConfig::builder().chunk_size(self.chunk_size).chunk_overlap(self.chunk_overlap).build()
    }

    pub fn embedding_provider(&self) -> Arc<dyn EmbeddingProvider> {
        match self.embedder {
            EmbedderKind::Hashing => Arc::new(HashingEmbeddingProvider::new(
                self.embed_dimensions.unwrap_or(hashing::DEFAULT_DIMENSIONS),
            )),
            EmbedderKind::Ollama => Arc::new(
                OllamaEmbeddingProvider::new(&self.ollama_host).with_model(
                    &self.embed_model,
                    self.embed_dimensions.unwrap_or(DEFAULT_EMBED_DIMENSIONS),
                ),
            ),
        }
    }

    pub fn generator(&self) -> Arc<dyn AnswerGenerator> {
        Arc::new(OllamaGenerator::new(&self.ollama_host).with_model(&self.chat_model))
    }
}
