//! File-backed local store.
//!
//! The document lives in `<data-dir>/mcm-panel-data.json`. Writes go to a
//! temporary sibling first and are renamed into place, so a crash never
//! leaves a half-written document behind.

use panel_sync::local::{self, LocalStoreError, Result};
use panel_sync::{Document, LocalStore, STORAGE_KEY};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileLocalStore {
    dir: PathBuf,
    path: PathBuf,
}

impl FileLocalStore {
    /// Store the document under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(format!("{}.json", STORAGE_KEY));
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", STORAGE_KEY))
    }
}

fn io_err(e: std::io::Error) -> LocalStoreError {
    match e.kind() {
        ErrorKind::PermissionDenied => LocalStoreError::Unavailable(e.to_string()),
        ErrorKind::StorageFull | ErrorKind::QuotaExceeded => {
            LocalStoreError::QuotaExceeded(e.to_string())
        }
        _ => LocalStoreError::Io(e.to_string()),
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self) -> Result<Option<Document>> {
        match fs::read_to_string(&self.path) {
            Ok(blob) => Ok(local::decode_blob(&blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    fn set(&self, doc: &Document) -> Result<()> {
        let blob = doc
            .to_compact_json()
            .map_err(|e| LocalStoreError::Serialization(e.to_string()))?;

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let temp = self.temp_path();
        fs::write(&temp, blob).map_err(io_err)?;
        fs::rename(&temp, &self.path).map_err(io_err)?;
        debug!("Wrote local document to {:?}", self.path);
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }

    fn is_available(&self) -> bool {
        // Same probe the browser does: try a throwaway write.
        let probe = self.dir.join(".mcm-panel-probe");
        let ok = fs::create_dir_all(&self.dir).is_ok() && fs::write(&probe, b"x").is_ok();
        let _ = fs::remove_file(&probe);
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileLocalStore::new(dir.path());
        assert!(store.get().unwrap().is_none());
        assert!(store.is_available());
    }

    #[test]
    fn test_set_and_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileLocalStore::new(dir.path().join("nested"));

        let mut doc = Document::new();
        doc.insert("albums", json!({"data": [{"title": "Pascua"}]}));
        store.set(&doc).unwrap();

        assert!(store.path().ends_with("mcm-panel-data.json"));
        assert_eq!(store.get().unwrap(), Some(doc));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_corrupt_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileLocalStore::new(dir.path());
        fs::write(store.path(), "{ nope").unwrap();
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileLocalStore::new(dir.path());
        store.set(&Document::new()).unwrap();

        store.remove().unwrap();
        store.remove().unwrap();
        assert!(store.get().unwrap().is_none());
    }
}
