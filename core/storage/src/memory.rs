//! In-memory key-value store for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::store::KeyValueStore;
use foldertrail_common::{Error, Result};

/// In-memory key-value store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
    fail_writes: Arc<RwLock<bool>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`remove` fail with a storage error.
    ///
    /// Lets tests exercise the paths that tolerate store write failures.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.write() {
            *flag = fail;
        }
    }

    fn check_writable(&self) -> Result<()> {
        let failing = self
            .fail_writes
            .read()
            .map_err(|_| Error::Storage("Lock poisoned".to_string()))?;
        if *failing {
            return Err(Error::Storage("Store is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::Storage("Lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check_writable()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Storage("Lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.check_writable()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Storage("Lock poisoned".to_string()))?;
        Ok(entries.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::Storage("Lock poisoned".to_string()))?;
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        store.set("accessToken", json!("tok")).await.unwrap();

        assert_eq!(store.get("accessToken").await.unwrap(), Some(json!("tok")));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_reports_presence() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();

        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_prefixed_leaves_other_keys() {
        let store = MemoryStore::new();
        store.set("folderInfo_a", json!(1)).await.unwrap();
        store.set("folderInfo_b", json!(2)).await.unwrap();
        store.set("accessToken", json!("tok")).await.unwrap();

        let removed = store.remove_prefixed("folderInfo_").await.unwrap();
        assert_eq!(removed, 2);

        let keys = store.keys().await.unwrap();
        assert_eq!(keys, vec!["accessToken".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();
        store.set_fail_writes(true);

        assert!(matches!(
            store.set("b", json!(2)).await,
            Err(Error::Storage(_))
        ));
        assert!(store.remove("a").await.is_err());
        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", json!("v")).await.unwrap();

        assert_eq!(other.get("k").await.unwrap(), Some(json!("v")));
    }
}
