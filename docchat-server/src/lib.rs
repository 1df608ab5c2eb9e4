//! `docchat-server` serves document upload, semantic search and
//! retrieval-augmented chat over HTTP on top of `docchat-rag`.

pub mod config;
pub mod error;
pub mod extract;
pub mod protocol;
pub mod server;
pub mod service;
pub mod store;
pub mod telemetry;

pub use config::{EmbedderKind, LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{AppState, app_router, build_state, run_server};
pub use service::DocumentService;
pub use store::DocumentStore;
