//! Key-value store trait definition.

use async_trait::async_trait;
use serde_json::Value;

use foldertrail_common::Result;

/// Durable key-value store shared by the credential and cache layers.
///
/// Implementations must be safe to call concurrently; the last write to a
/// key wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Postconditions
    /// - The value is durable once this returns `Ok`
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`. Returns whether it was present.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// List every key currently stored.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Remove every key starting with `prefix`, returning the count removed.
    async fn remove_prefixed(&self, prefix: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.keys().await? {
            if key.starts_with(prefix) && self.remove(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
