//! Per-document async locks.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per document id, created on demand and dropped once idle.
///
/// Holders of the same id run one at a time; different ids never contend.
#[derive(Default)]
pub struct DocumentLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive access to `document_id`.
    pub async fn acquire(&self, document_id: &str) -> DocumentGuard<'_> {
        let lock = Arc::clone(self.map().entry(document_id.to_string()).or_default());
        let guard = lock.lock_owned().await;
        DocumentGuard { locks: self, document_id: document_id.to_string(), guard: Some(guard) }
    }

    /// Whether no id is currently locked or waited on.
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

/// Exclusive access to one document id, released on drop.
pub struct DocumentGuard<'a> {
    locks: &'a DocumentLocks,
    document_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.map();
        if map.get(&self.document_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(&self.document_id);
        }
    }
}
