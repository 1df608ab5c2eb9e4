//! On-disk document storage.
//!
//! Layout under the data directory:
//!
//! ```text
//! uploads/{id}_{filename}   original bytes as uploaded
//! processed/{id}.json       DocumentRecord, including the extracted text
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docchat_rag::{DocumentRecord, DocumentSummary, RagError, Result};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const UPLOADS_DIR: &str = "uploads";
const PROCESSED_DIR: &str = "processed";

/// Number of hex characters kept from the id hash.
const ID_LEN: usize = 12;

fn store_error(context: impl std::fmt::Display, err: impl std::fmt::Display) -> RagError {
    RagError::Store(format!("{context}: {err}"))
}

/// Derive a document id from the file name and upload time.
pub fn document_id(filename: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{filename}_{}", at.timestamp_millis()).as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash.chars().take(ID_LEN).collect()
}

/// Ids are generated as hex, but anything path-safe is accepted on lookup.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// The final path component of `filename` with unsafe characters replaced.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() { "upload".to_string() } else { cleaned }
}

/// JSON-file metadata store plus the uploaded originals.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    uploads: PathBuf,
    processed: PathBuf,
}

impl DocumentStore {
    /// Open (creating if needed) the store rooted at `data_dir`.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let store = Self {
            uploads: data_dir.join(UPLOADS_DIR),
            processed: data_dir.join(PROCESSED_DIR),
        };
        for dir in [&store.uploads, &store.processed] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| store_error(format_args!("creating {}", dir.display()), e))?;
        }
        Ok(store)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.processed.join(format!("{id}.json"))
    }

    /// Write the uploaded bytes under a fresh id.
    ///
    /// The id is derived from `filename` and `at`; if a file with that id
    /// already exists the timestamp is advanced by a millisecond until a
    /// free id is found, so the returned id is reserved for this upload.
    pub async fn save_upload(
        &self,
        filename: &str,
        at: DateTime<Utc>,
        bytes: &[u8],
    ) -> Result<(String, PathBuf)> {
        let safe_name = sanitize_filename(filename);
        let mut at = at;
        loop {
            let id = document_id(filename, at);
            let path = self.uploads.join(format!("{id}_{safe_name}"));
            let opened =
                fs::OpenOptions::new().write(true).create_new(true).open(&path).await;
            let mut file = match opened {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    at += chrono::Duration::milliseconds(1);
                    continue;
                }
                Err(e) => return Err(store_error(format_args!("creating {}", path.display()), e)),
            };

            let written = async {
                file.write_all(bytes).await?;
                file.flush().await
            };
            if let Err(e) = written.await {
                let _ = fs::remove_file(&path).await;
                return Err(store_error(format_args!("writing {}", path.display()), e));
            }
            debug!(document.id = %id, path = %path.display(), size = bytes.len(), "saved upload");
            return Ok((id, path));
        }
    }

    /// Remove the uploaded original of `id`. Returns whether a file was removed.
    pub async fn remove_upload(&self, id: &str) -> Result<bool> {
        if !is_valid_id(id) {
            return Ok(false);
        }
        let prefix = format!("{id}_");
        let mut entries = fs::read_dir(&self.uploads)
            .await
            .map_err(|e| store_error("listing uploads", e))?;
        while let Some(entry) =
            entries.next_entry().await.map_err(|e| store_error("listing uploads", e))?
        {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                fs::remove_file(entry.path())
                    .await
                    .map_err(|e| store_error(format_args!("removing upload of {id}"), e))?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Persist `record` as pretty-printed JSON, replacing any previous version atomically.
    pub async fn save_record(&self, record: &DocumentRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| store_error(format_args!("serializing {}", record.id), e))?;
        let path = self.record_path(&record.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| store_error(format_args!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| store_error(format_args!("renaming {}", tmp.display()), e))
    }

    pub async fn load_record(&self, id: &str) -> Result<Option<DocumentRecord>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.record_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_error(format_args!("reading {}", path.display()), e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| store_error(format_args!("parsing {}", path.display()), e))
    }

    /// Remove the record of `id`. Returns whether it existed.
    pub async fn remove_record(&self, id: &str) -> Result<bool> {
        if !is_valid_id(id) {
            return Ok(false);
        }
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(store_error(format_args!("removing record {id}"), e)),
        }
    }

    /// Every readable record. Unparseable files are logged and skipped.
    pub async fn list_records(&self) -> Result<Vec<DocumentRecord>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.processed)
            .await
            .map_err(|e| store_error("listing records", e))?;
        while let Some(entry) =
            entries.next_entry().await.map_err(|e| store_error("listing records", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let parsed = match fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<DocumentRecord>(&bytes)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(record) => records.push(record),
                Err(error) => warn!(path = %path.display(), %error, "skipping unreadable record"),
            }
        }
        Ok(records)
    }

    /// Record summaries without content, newest upload first.
    pub async fn list_summaries(&self) -> Result<Vec<DocumentSummary>> {
        let mut summaries: Vec<DocumentSummary> =
            self.list_records().await?.iter().map(DocumentRecord::summary).collect();
        summaries.sort_by(|a, b| {
            b.metadata.upload_time.cmp(&a.metadata.upload_time).then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }
}
