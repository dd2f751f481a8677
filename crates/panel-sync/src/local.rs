//! LocalStore trait: one fixed key holding the whole document as a JSON blob.
//!
//! Implementations:
//! - `InMemoryLocal` - For testing
//! - `FileLocalStore` (in panel-cli) - A JSON file in the data directory
//! - `JsLocalStorageBridge` (in panel-wasm) - `window.localStorage` via JS callbacks
//!
//! All operations are synchronous, matching browser `localStorage`.

use crate::document::Document;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tracing::warn;

/// Storage key under which the document blob lives.
pub const STORAGE_KEY: &str = "mcm-panel-data";

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("Local storage unavailable: {0}")]
    Unavailable(String),

    #[error("Local storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, LocalStoreError>;

/// Key-value storage for the single document blob.
pub trait LocalStore {
    /// Read the stored document. A blob that does not parse reads as `None`.
    fn get(&self) -> Result<Option<Document>>;

    /// Replace the stored document.
    fn set(&self, doc: &Document) -> Result<()>;

    /// Delete the stored document.
    fn remove(&self) -> Result<()>;

    /// Whether the storage accepts writes at all.
    fn is_available(&self) -> bool;
}

/// Parse a stored blob, logging and discarding corrupt data.
pub fn decode_blob(blob: &str) -> Option<Document> {
    match Document::from_json_bytes(blob.as_bytes()) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!("Ignoring unreadable local document: {}", e);
            None
        }
    }
}

/// In-memory local store for testing
pub struct InMemoryLocal {
    blob: RwLock<Option<String>>,
    available: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryLocal {
    pub fn new() -> Self {
        Self {
            blob: RwLock::new(None),
            available: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Start with a stored document (a returning local-mode session).
    pub fn with_document(doc: &Document) -> Self {
        let store = Self::new();
        if let Ok(blob) = doc.to_compact_json() {
            *store.blob.write().unwrap_or_else(|e| e.into_inner()) = Some(blob);
        }
        store
    }

    /// Store raw text, bypassing serialization (corrupt-blob tests).
    pub fn set_raw(&self, blob: &str) {
        *self.blob.write().unwrap_or_else(|e| e.into_inner()) = Some(blob.to_string());
    }

    pub fn raw(&self) -> Option<String> {
        self.blob.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make every `set` fail as if the quota were exhausted.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Simulate storage disabled by the browser.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful `set` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryLocal {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for InMemoryLocal {
    fn get(&self) -> Result<Option<Document>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LocalStoreError::Unavailable("storage disabled".into()));
        }
        let blob = self.blob.read().unwrap_or_else(|e| e.into_inner());
        Ok(blob.as_deref().and_then(decode_blob))
    }

    fn set(&self, doc: &Document) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LocalStoreError::Unavailable("storage disabled".into()));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LocalStoreError::QuotaExceeded(format!(
                "setting '{}' exceeded the quota",
                STORAGE_KEY
            )));
        }
        let blob = doc
            .to_compact_json()
            .map_err(|e| LocalStoreError::Serialization(e.to_string()))?;
        *self.blob.write().unwrap_or_else(|e| e.into_inner()) = Some(blob);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LocalStoreError::Unavailable("storage disabled".into()));
        }
        self.blob.write().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inmemory_local_basic_operations() {
        let store = InMemoryLocal::new();
        assert!(store.get().unwrap().is_none());

        let mut doc = Document::new();
        doc.insert("albums", json!({"data": [1, 2]}));
        store.set(&doc).unwrap();

        assert_eq!(store.get().unwrap(), Some(doc));
        assert_eq!(store.write_count(), 1);

        store.remove().unwrap();
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_blob_reads_as_none() {
        let store = InMemoryLocal::new();
        store.set_raw("{ truncated");
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn test_quota_failure() {
        let store = InMemoryLocal::new();
        store.set_fail_writes(true);
        let err = store.set(&Document::new()).unwrap_err();
        assert!(matches!(err, LocalStoreError::QuotaExceeded(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_unavailable_storage() {
        let store = InMemoryLocal::new();
        store.set_available(false);
        assert!(!store.is_available());
        assert!(matches!(store.get(), Err(LocalStoreError::Unavailable(_))));
    }
}
