use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::header,
    response::{Html, IntoResponse},
    routing::{delete, get, post},
};
use docchat_rag::{
    AnswerGenerator, CollectionStats, DEFAULT_MAX_CONTEXT_CHARS, RetrievalEngine, build_prompt,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    protocol::{
        ChatRequest, ChatResponse, DeleteResponse, DocumentListResponse, NO_DOCUMENTS_ANSWER,
        SearchRequest, SearchResponse, UploadResponse,
    },
    service::DocumentService,
    store::DocumentStore,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RetrievalEngine>,
    pub documents: Arc<DocumentService>,
    pub generator: Arc<dyn AnswerGenerator>,
    pub max_upload_bytes: usize,
    pub max_context_chars: usize,
}

/// Open the store, build the engine and re-index every stored document.
pub async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let store = DocumentStore::open(&config.data_dir)
        .await
        .with_context(|| format!("failed to open data directory {}", config.data_dir.display()))?;
    let engine = RetrievalEngine::builder()
        .config(config.rag_config()?)
        .embedding_provider(config.embedding_provider())
        .build()?;
    let engine = Arc::new(engine);

    let documents = Arc::new(DocumentService::new(store, engine.clone()));
    documents.restore().await?;

    Ok(AppState {
        engine,
        documents,
        generator: config.generator(),
        max_upload_bytes: config.max_upload_bytes(),
        max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
    })
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/static/app.js", get(app_js))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/documents", get(list_documents))
        .route("/documents/{id}", delete(delete_document))
        .route("/search", post(search))
        .route("/chat", post(chat))
        .route("/stats", get(stats))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let engine = state.engine.clone();
    let app = app_router(state);
    let addr: SocketAddr =
        config.bind_addr().parse().with_context(|| "invalid host/port for docchat server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(model = %config.chat_model, "docchat listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    engine.shutdown().await;
    info!("docchat stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
}

async fn index() -> impl IntoResponse {
    Html(include_str!("../ui/index.html"))
}

async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/javascript; charset=utf-8")], include_str!("../ui/app.js"))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "docchat"}))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Json<UploadResponse>> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        file = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = file.ok_or(ServerError::MissingFile)?;
    if filename.trim().is_empty() {
        return Err(ServerError::MissingFile);
    }

    let document = state.documents.upload(&filename, bytes.to_vec()).await?;
    Ok(Json(UploadResponse {
        success: true,
        message: format!("'{filename}' uploaded and indexed"),
        document,
    }))
}

async fn list_documents(
    State(state): State<AppState>,
) -> ServerResult<Json<DocumentListResponse>> {
    let documents = state.documents.list().await?;
    Ok(Json(DocumentListResponse { documents }))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<DeleteResponse>> {
    state.documents.delete(&id).await?;
    Ok(Json(DeleteResponse { success: true, message: format!("document {id} deleted") }))
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ServerResult<Json<SearchResponse>> {
    let n_results = request.n_results.unwrap_or(state.engine.config().top_k);
    let results =
        state.engine.search_documents(&request.query, n_results, request.score_threshold).await?;
    Ok(Json(SearchResponse { query: request.query, total: results.len(), results }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ServerResult<Json<ChatResponse>> {
    let question = request.question.trim().to_string();
    if question.is_empty() {
        return Err(ServerError::BadRequest("question must not be empty".to_string()));
    }

    if state.engine.get_collection_stats().await.document_count == 0 {
        return Ok(Json(ChatResponse::answered(
            question,
            NO_DOCUMENTS_ANSWER.to_string(),
            Vec::new(),
        )));
    }

    let n_results = request.n_results.unwrap_or(state.engine.config().top_k);
    let sources = state.engine.search_documents(&question, n_results, None).await?;
    let prompt = build_prompt(&question, &sources, state.max_context_chars);

    let response = match state.generator.generate(&prompt).await {
        Ok(answer) => ChatResponse::answered(question, answer, sources),
        Err(e) => {
            warn!(
                model = %state.generator.model_name(),
                error = %e,
                sources = sources.len(),
                "answer generation unavailable"
            );
            ChatResponse::degraded(question, e.to_string(), sources)
        }
    };
    Ok(Json(response))
}

async fn stats(State(state): State<AppState>) -> Json<CollectionStats> {
    Json(state.engine.get_collection_stats().await)
}
