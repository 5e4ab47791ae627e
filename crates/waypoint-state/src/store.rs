//! Progress store implementations.
//!
//! The store is an opaque get/set collaborator: last write wins, no locking
//! across processes, no transactions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use waypoint_core::{Result, WaypointError};

/// A versioned store entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    /// The key for this entry.
    pub key: String,

    /// The value.
    pub value: serde_json::Value,

    /// Version number, increasing across every key of a store. A
    /// [`JsonFileStore`] resumes from the highest version on disk.
    pub version: u64,

    /// Timestamp when this version was written.
    pub timestamp: DateTime<Utc>,
}

/// Trait for progress stores.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Get the current value for a key.
    async fn get(&self, key: &str) -> Result<Option<StoreEntry>>;

    /// Set a value for a key, replacing any previous value.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<StoreEntry>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Get all keys in the store.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory implementation of ProgressStore.
pub struct InMemoryProgressStore {
    entries: Arc<RwLock<HashMap<String, StoreEntry>>>,

    /// Global version counter.
    version: Arc<RwLock<u64>>,
}

impl InMemoryProgressStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            version: Arc::new(RwLock::new(0)),
        }
    }

    async fn next_version(&self) -> u64 {
        let mut version = self.version.write().await;
        *version += 1;
        *version
    }
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn get(&self, key: &str) -> Result<Option<StoreEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<StoreEntry> {
        let version = self.next_version().await;
        let entry = StoreEntry {
            key: key.to_string(),
            value,
            version,
            timestamp: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry.clone());

        Ok(entry)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Stores one `<key>.json` file per key in a directory.
///
/// Keys are sanitized: characters outside `[A-Za-z0-9_-]` become `_`, so two
/// keys differing only in such characters share a file.
pub struct JsonFileStore {
    dir: PathBuf,
    version: Arc<RwLock<u64>>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// Versions continue from the highest one found in existing files.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let latest = scan_entries(&dir)
            .await?
            .iter()
            .map(|entry| entry.version)
            .max()
            .unwrap_or(0);
        tracing::debug!("Opened progress store {} at version {}", dir.display(), latest);

        Ok(Self {
            dir,
            version: Arc::new(RwLock::new(latest)),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl ProgressStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<StoreEntry>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        let entry: StoreEntry = serde_json::from_slice(&bytes)?;
        Ok(Some(entry))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<StoreEntry> {
        let version = {
            let mut version = self.version.write().await;
            *version += 1;
            *version
        };
        let entry = StoreEntry {
            key: key.to_string(),
            value,
            version,
            timestamp: Utc::now(),
        };

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&entry)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        tracing::debug!("Wrote progress entry '{}' to {}", key, path.display());
        Ok(entry)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = scan_entries(&self.dir)
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Every readable `*.json` entry in `dir`. Unreadable files are skipped.
async fn scan_entries(dir: &Path) -> Result<Vec<StoreEntry>> {
    let mut listing = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_error(dir, e))?;

    let mut entries = Vec::new();
    while let Some(item) = listing.next_entry().await.map_err(|e| io_error(dir, e))? {
        let path = item.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(entry) = read_entry(&path).await {
            entries.push(entry);
        }
    }
    Ok(entries)
}

async fn read_entry(path: &Path) -> Option<StoreEntry> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!("Skipping unreadable store file {}: {}", path.display(), e);
            None
        }
    }
}

fn io_error(path: &Path, err: std::io::Error) -> WaypointError {
    WaypointError::StateError {
        message: format!("{}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryProgressStore::new();

        store.set("progress:ada", serde_json::json!({"value": 42})).await.unwrap();

        let entry = store.get("progress:ada").await.unwrap();
        assert!(entry.is_some());
        assert_eq!(entry.unwrap().value["value"], 42);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = InMemoryProgressStore::new();

        let e1 = store.set("k", serde_json::json!("v1")).await.unwrap();
        let e2 = store.set("k", serde_json::json!("v2")).await.unwrap();

        assert!(e2.version > e1.version);
        let current = store.get("k").await.unwrap().unwrap();
        assert_eq!(current.value, "v2");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryProgressStore::new();

        store.set("k", serde_json::json!("value")).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("never-set").await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        assert!(store.get("progress:ada").await.unwrap().is_none());

        store
            .set("progress:ada", serde_json::json!({"currentStep": 2}))
            .await
            .unwrap();
        let entry = store.get("progress:ada").await.unwrap().unwrap();
        assert_eq!(entry.value["currentStep"], 2);
        assert!(dir.path().join("progress_ada.json").exists());

        assert_eq!(store.keys().await.unwrap(), vec!["progress:ada".to_string()]);

        store.delete("progress:ada").await.unwrap();
        assert!(store.get("progress:ada").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.set("s1", serde_json::json!([1, 2])).await.unwrap();
        }

        let reopened = JsonFileStore::open(dir.path()).await.unwrap();
        let entry = reopened.get("s1").await.unwrap().unwrap();
        assert_eq!(entry.value, serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn test_file_store_versions_continue_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let last = {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.set("a", serde_json::json!(1)).await.unwrap();
            store.set("b", serde_json::json!(2)).await.unwrap();
            store.set("a", serde_json::json!(3)).await.unwrap().version
        };
        std::fs::write(dir.path().join("junk.json"), b"{not json").unwrap();

        let reopened = JsonFileStore::open(dir.path()).await.unwrap();
        let next = reopened.set("b", serde_json::json!(4)).await.unwrap();

        assert_eq!(last, 3);
        assert!(next.version > last);
        assert_eq!(reopened.get("b").await.unwrap().unwrap().version, next.version);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{not json").unwrap();

        assert!(store.get("bad").await.is_err());
        assert!(store.keys().await.unwrap().is_empty());
    }
}
