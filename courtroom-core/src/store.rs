//! Append-only record storage.
//!
//! Records are identified by a string id, written exactly once, and never
//! modified or deleted afterwards.

use crate::persist::temp_sibling;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors from record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record already exists: {0}")]
    Duplicate(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid record id: {0:?}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write-once storage for serialized records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a new record. Fails with [`StoreError::Duplicate`] if `id` exists.
    async fn append(&self, id: &str, contents: &str) -> Result<(), StoreError>;

    /// Read a record's contents.
    async fn read(&self, id: &str) -> Result<String, StoreError>;

    /// Ids of all stored records, in no particular order.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

/// Ids become file names, so path separators and dot-prefixed names are refused.
fn check_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// One `{id}.json` file per record inside a directory.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn append(&self, id: &str, contents: &str) -> Result<(), StoreError> {
        check_id(id)?;
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(id);
        let tmp = temp_sibling(&path).map_err(|_| StoreError::InvalidId(id.to_string()))?;
        fs::write(&tmp, contents).await?;

        // Linking fails if the target exists, so an existing record is never replaced.
        let linked = fs::hard_link(&tmp, &path).await;
        let _ = fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => {
                debug!(path = %path.display(), "appended record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::Duplicate(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, id: &str) -> Result<String, StoreError> {
        check_id(id)?;
        match fs::read_to_string(self.path_for(id)).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) {
                    if !stem.starts_with('.') {
                        ids.push(stem);
                    }
                }
            }
        }

        Ok(ids)
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn append(&self, id: &str, contents: &str) -> Result<(), StoreError> {
        check_id(id)?;
        let mut records = self.records.write().await;
        if records.contains_key(id) {
            return Err(StoreError::Duplicate(id.to_string()));
        }
        records.insert(id.to_string(), contents.to_string());
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<String, StoreError> {
        check_id(id)?;
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_append_and_read() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileRecordStore::new(temp_dir.path().join("records"));

        store.append("alpha", "{\"a\":1}").await.unwrap();
        assert_eq!(store.read("alpha").await.unwrap(), "{\"a\":1}");
        assert_eq!(store.list().await.unwrap(), vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_never_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileRecordStore::new(temp_dir.path());

        store.append("alpha", "first").await.unwrap();
        let result = store.append("alpha", "second").await;
        assert!(matches!(result, Err(StoreError::Duplicate(id)) if id == "alpha"));
        assert_eq!(store.read("alpha").await.unwrap(), "first");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_missing_record() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileRecordStore::new(temp_dir.path());
        assert!(matches!(
            store.read("ghost").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_list_skips_foreign_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileRecordStore::new(temp_dir.path());
        store.append("kept", "{}").await.unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(temp_dir.path().join(".kept.json.tmp"), "{}").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_missing_dir_lists_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileRecordStore::new(temp_dir.path().join("never_created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let store = MemoryRecordStore::new();
        for id in ["", "../escape", ".hidden", "a/b"] {
            assert!(matches!(
                store.append(id, "{}").await,
                Err(StoreError::InvalidId(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_both_stores_reject_path_like_reads() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file_store = FileRecordStore::new(temp_dir.path().join("records"));
        let memory_store = MemoryRecordStore::new();
        std::fs::write(temp_dir.path().join("outside.json"), "{}").unwrap();

        for id in ["../outside", ".hidden", "a\\b"] {
            assert!(matches!(
                file_store.read(id).await,
                Err(StoreError::InvalidId(_))
            ));
            assert!(matches!(
                memory_store.read(id).await,
                Err(StoreError::InvalidId(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_memory_store_duplicate() {
        let store = MemoryRecordStore::new();
        store.append("one", "1").await.unwrap();
        assert!(matches!(
            store.append("one", "2").await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.read("one").await.unwrap(), "1");
    }
}
