//! Key-Value Persistence
//!
//! The rule store and the fallback matcher only ever talk to storage
//! through [`KeyValueStore`]: read a set of keys, write a set of keys.
//!
//! Two implementations:
//! - `MemoryStorage`: in-process map, for tests and embedding
//! - `FileStorage`: one JSON object on disk, replaced atomically on write

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// A batch of stored values, keyed by name
pub type StorageItems = Map<String, Value>;

/// Errors that can occur while reading or writing storage
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt storage data: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Opaque key-value persistence service
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the given keys; absent keys are simply missing from the result
    async fn get(&self, keys: &[&str]) -> Result<StorageItems, StorageError>;

    /// Write all items in one step. Other keys are kept.
    async fn set(&self, items: StorageItems) -> Result<(), StorageError>;
}

fn select(all: &StorageItems, keys: &[&str]) -> StorageItems {
    keys.iter()
        .filter_map(|key| all.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

/// In-memory storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<StorageItems>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a JSON object; anything else yields empty storage
    pub fn with_items(items: Value) -> Self {
        let items = match items {
            Value::Object(map) => map,
            _ => StorageItems::new(),
        };
        Self {
            items: RwLock::new(items),
        }
    }

    /// Copy of everything stored
    pub async fn snapshot(&self) -> StorageItems {
        self.items.read().await.clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageItems, StorageError> {
        Ok(select(&*self.items.read().await, keys))
    }

    async fn set(&self, items: StorageItems) -> Result<(), StorageError> {
        self.items.write().await.extend(items);
        Ok(())
    }
}

/// JSON file storage.
///
/// Writes go to a temp file next to the target and are renamed over it,
/// so readers see either the old or the new object, never a torn one.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open (or lazily create) storage at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        info!("File storage at: {}", path.display());

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<StorageItems, StorageError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StorageItems::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(StorageItems::new());
        }

        match serde_json::from_slice(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StorageError::Corrupt(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(StorageError::Corrupt(format!("{}: {}", self.path.display(), e))),
        }
    }

    async fn write_all(&self, items: &StorageItems) -> Result<(), StorageError> {
        let data = serde_json::to_vec_pretty(items)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        // Write to temp file first (atomic write pattern)
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!("Wrote {} bytes to {}", data.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageItems, StorageError> {
        Ok(select(&self.read_all().await?, keys))
    }

    async fn set(&self, items: StorageItems) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read_all().await?;
        all.extend(items);
        self.write_all(&all).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(value: Value) -> StorageItems {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_memory_get_selects_keys() {
        let storage = MemoryStorage::with_items(json!({ "a": 1, "b": 2 }));

        let got = storage.get(&["a", "missing"]).await.unwrap();
        assert_eq!(Value::Object(got), json!({ "a": 1 }));
    }

    #[tokio::test]
    async fn test_memory_set_merges() {
        let storage = MemoryStorage::with_items(json!({ "a": 1, "b": 2 }));
        storage.set(items(json!({ "b": 3, "c": 4 }))).await.unwrap();

        assert_eq!(
            Value::Object(storage.snapshot().await),
            json!({ "a": 1, "b": 3, "c": 4 })
        );
    }

    #[tokio::test]
    async fn test_file_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("nested/storage.json"))
            .await
            .unwrap();

        assert!(storage.get(&["a"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let storage = FileStorage::open(&path).await.unwrap();
        storage.set(items(json!({ "a": [1, 2] }))).await.unwrap();
        storage.set(items(json!({ "b": "x" }))).await.unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).await.unwrap();
        let got = reopened.get(&["a", "b"]).await.unwrap();
        assert_eq!(Value::Object(got), json!({ "a": [1, 2], "b": "x" }));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_file_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let storage = FileStorage::open(&path).await.unwrap();
        assert!(matches!(
            storage.get(&["a"]).await,
            Err(StorageError::Corrupt(_))
        ));
        // A failed read must not clobber the file
        assert!(storage.set(items(json!({ "a": 1 }))).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1, 2, 3]");
    }
}
