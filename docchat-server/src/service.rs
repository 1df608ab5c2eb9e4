//! Upload and delete transactions spanning the store and the retrieval engine.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use docchat_rag::{DocumentLocks, DocumentRecord, DocumentSummary, RetrievalEngine};
use tracing::{error, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::extract::{FileType, extract_text};
use crate::store::DocumentStore;

/// Keeps the document store and the engine's index in step.
///
/// An upload writes the original file, extracts its text, persists the
/// record and indexes it. If any step fails, the steps already taken are
/// undone before the error is returned, so a failed upload leaves neither a
/// record nor indexed chunks behind. An upload holds its id's lock from the
/// moment the id is reserved until it is indexed; a delete of the same id
/// waits for it.
pub struct DocumentService {
    store: DocumentStore,
    engine: Arc<RetrievalEngine>,
    locks: DocumentLocks,
}

impl DocumentService {
    pub fn new(store: DocumentStore, engine: Arc<RetrievalEngine>) -> Self {
        Self { store, engine, locks: DocumentLocks::new() }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Store, extract, record and index one uploaded file.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> ServerResult<DocumentSummary> {
        let file_type = FileType::from_filename(filename).ok_or_else(|| {
            let ext = Path::new(filename)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            ServerError::UnsupportedFileType(ext)
        })?;

        let uploaded_at = Utc::now();
        let size = bytes.len() as u64;
        let (id, _) = self.store.save_upload(filename, uploaded_at, &bytes).await?;
        let _guard = self.locks.acquire(&id).await;

        let content = match extract_text(file_type, filename, bytes).await {
            Ok(content) => content,
            Err(e) => {
                warn!(document.id = %id, filename, error = %e, "text extraction failed");
                self.discard(&id, false).await;
                return Err(e.into());
            }
        };

        let record =
            DocumentRecord::new(&id, filename, file_type.as_str(), size, content, uploaded_at);
        if let Err(e) = self.store.save_record(&record).await {
            self.discard(&id, false).await;
            return Err(e.into());
        }

        if let Err(e) =
            self.engine.add_document(&id, &record.content, record.metadata.clone()).await
        {
            self.discard(&id, true).await;
            return Err(e.into());
        }

        info!(
            document.id = %id,
            filename,
            file_type = %file_type,
            word_count = record.metadata.word_count,
            "document uploaded"
        );
        Ok(record.summary())
    }

    /// Undo the persisted parts of a failed upload.
    async fn discard(&self, id: &str, has_record: bool) {
        if has_record {
            if let Err(e) = self.store.remove_record(id).await {
                error!(document.id = %id, error = %e, "failed to remove record of failed upload");
            }
        }
        if let Err(e) = self.store.remove_upload(id).await {
            error!(document.id = %id, error = %e, "failed to remove file of failed upload");
        }
    }

    /// Remove a document from the index, the store and the uploads directory.
    pub async fn delete(&self, id: &str) -> ServerResult<()> {
        let _guard = self.locks.acquire(id).await;
        let in_store = self.store.load_record(id).await?.is_some();
        if !in_store && !self.engine.contains_document(id).await {
            return Err(ServerError::NotFound(id.to_string()));
        }

        self.engine.remove_document(id).await?;
        self.store.remove_record(id).await?;
        if !self.store.remove_upload(id).await? {
            warn!(document.id = %id, "no uploaded file found for document");
        }
        info!(document.id = %id, "document deleted");
        Ok(())
    }

    /// Summaries of every stored document, newest first.
    pub async fn list(&self) -> ServerResult<Vec<DocumentSummary>> {
        Ok(self.store.list_summaries().await?)
    }

    /// Re-index every stored record. Returns how many were indexed.
    ///
    /// Records that fail to index are logged and skipped; they stay in the
    /// store and can be deleted through the API.
    pub async fn restore(&self) -> ServerResult<usize> {
        let records = self.store.list_records().await?;
        let total = records.len();
        let mut restored = 0;
        for record in records {
            match self.engine.add_document(&record.id, &record.content, record.metadata).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(document.id = %record.id, error = %e, "failed to restore document"),
            }
        }
        info!(restored, total, "restored document index");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use docchat_rag::{EmbeddingProvider, HashingEmbeddingProvider};
    use tokio::sync::{Notify, Semaphore};

    use super::*;

    /// Hashing embedder that signals each call and then waits for a permit.
    struct GatedEmbedder {
        inner: HashingEmbeddingProvider,
        started: Notify,
        gate: Semaphore,
    }

    #[async_trait]
    impl EmbeddingProvider for GatedEmbedder {
        async fn embed(&self, text: &str) -> docchat_rag::Result<Vec<f32>> {
            self.started.notify_one();
            let _permit = self.gate.acquire().await.unwrap();
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn model_id(&self) -> String {
            "gated".to_string()
        }
    }

    async fn service(dir: &Path) -> DocumentService {
        let store = DocumentStore::open(dir).await.unwrap();
        let engine = RetrievalEngine::builder()
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
            .build()
            .unwrap();
        DocumentService::new(store, Arc::new(engine))
    }

    async fn file_count(dir: &Path) -> usize {
        let mut count = 0;
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn upload_then_delete_cleans_everything() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path()).await;

        let summary = service.upload("paris.txt", b"Paris is in France.".to_vec()).await.unwrap();
        assert_eq!(summary.metadata.file_type, "txt");
        assert_eq!(summary.metadata.word_count, 4);
        assert_eq!(service.list().await.unwrap().len(), 1);
        assert!(service.engine.contains_document(&summary.id).await);

        service.delete(&summary.id).await.unwrap();
        assert!(service.list().await.unwrap().is_empty());
        assert_eq!(file_count(&dir.path().join("uploads")).await, 0);
        assert!(matches!(service.delete(&summary.id).await, Err(ServerError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_extraction_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path()).await;

        let err = service.upload("broken.docx", b"not a zip".to_vec()).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(file_count(&dir.path().join("uploads")).await, 0);
        assert_eq!(file_count(&dir.path().join("processed")).await, 0);
    }

    #[tokio::test]
    async fn unsupported_type_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path()).await;

        let err = service.upload("tool.exe", vec![0, 1, 2]).await.unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedFileType(ext) if ext == "exe"));
        assert_eq!(file_count(&dir.path().join("uploads")).await, 0);
    }

    #[tokio::test]
    async fn symbol_heavy_markdown_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path()).await;

        let body = b"---\n\n# Title\nParis is the capital of France.".to_vec();
        let summary = service.upload("notes.md", body).await.unwrap();
        assert!(service.engine.contains_document(&summary.id).await);

        let body = "😀😀 —".as_bytes().to_vec();
        let summary = service.upload("faces.txt", body).await.unwrap();
        assert!(service.engine.contains_document(&summary.id).await);
    }

    #[tokio::test]
    async fn delete_waits_for_an_upload_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let embedder = Arc::new(GatedEmbedder {
            inner: HashingEmbeddingProvider::new(64),
            started: Notify::new(),
            gate: Semaphore::new(0),
        });
        let engine = RetrievalEngine::builder().embedding_provider(embedder.clone()).build();
        let engine = Arc::new(engine.unwrap());
        let service = Arc::new(DocumentService::new(store, engine.clone()));

        let upload = {
            let service = Arc::clone(&service);
            let body = b"Paris and the Seine".to_vec();
            tokio::spawn(async move { service.upload("a.txt", body).await })
        };
        embedder.started.notified().await;

        // The record is already visible while the upload is still indexing.
        let id = service.list().await.unwrap()[0].id.clone();
        let delete = {
            let service = Arc::clone(&service);
            let id = id.clone();
            tokio::spawn(async move { service.delete(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!delete.is_finished());

        embedder.gate.add_permits(1);
        upload.await.unwrap().unwrap();
        delete.await.unwrap().unwrap();

        assert!(!engine.contains_document(&id).await);
        assert!(!engine.vector_index().contains_document(&id).await);
        assert!(service.list().await.unwrap().is_empty());
        assert_eq!(file_count(&dir.path().join("uploads")).await, 0);
    }

    #[tokio::test]
    async fn restore_rebuilds_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let service = service(dir.path()).await;
            service.upload("a.md", b"# Seine\n\nThe river.".to_vec()).await.unwrap().id
        };

        let service = service(dir.path()).await;
        assert!(!service.engine.contains_document(&id).await);
        assert_eq!(service.restore().await.unwrap(), 1);
        assert!(service.engine.contains_document(&id).await);
        let stats = service.engine.get_collection_stats().await;
        assert_eq!(stats.document_count, 1);
    }
}
