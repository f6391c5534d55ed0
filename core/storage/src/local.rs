//! Local filesystem key-value store.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use crate::store::KeyValueStore;
use foldertrail_common::{Error, Result};

/// Key-value store persisted as a single JSON object on disk.
///
/// Nothing is kept in memory between calls: every operation reads the file,
/// so changes made by other processes sharing the file are always seen.
/// Mutations rewrite the file through a temporary sibling plus rename, so a
/// crash never leaves a half-written document behind.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by the file at `path`.
    ///
    /// # Postconditions
    /// - The parent directory exists
    /// - The file itself is created on the first write
    ///
    /// # Errors
    /// - Parent directory cannot be created
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => Ok(map),
                _ => Err(Error::Storage(format!(
                    "{} does not contain a JSON object",
                    self.path.display()
                ))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entries: &Map<String, Value>) -> Result<()> {
        let data = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read the current file and run `f` against it.
    async fn read_with<T>(&self, f: impl FnOnce(&Map<String, Value>) -> T) -> Result<T> {
        let _guard = self.lock.lock().await;
        let entries = self.load().await?;
        Ok(f(&entries))
    }

    /// Re-read the file, apply `f`, and write the result back when `f`
    /// reports a change.
    async fn modify<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Map<String, Value>) -> (T, bool),
    ) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let (out, changed) = f(&mut entries);

        if changed {
            if let Err(e) = self.persist(&entries).await {
                tracing::warn!("Failed to persist {}: {}", key, e);
                return Err(e);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.read_with(|entries| entries.get(key).cloned()).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.modify(key, |entries| {
            entries.insert(key.to_string(), value);
            ((), true)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.modify(key, |entries| {
            let existed = entries.remove(key).is_some();
            (existed, existed)
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.read_with(|entries| entries.keys().cloned().collect())
            .await
    }
}
