//! Time-limited cache of resolution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use foldertrail_common::{DocumentId, ResolutionResult, Result};
use foldertrail_storage::KeyValueStore;

/// Namespace prefix for cache keys in the durable store.
pub const CACHE_PREFIX: &str = "folderInfo_";

/// How long a cached result is served.
pub const CACHE_TTL: Duration = Duration::from_millis(300_000);

/// One cached resolution, stored as `{data, timestamp}` with a millisecond
/// epoch timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: ResolutionResult,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry fetched now.
    pub fn new(data: ResolutionResult) -> Self {
        Self {
            data,
            fetched_at: Utc::now(),
        }
    }

    /// Whether the entry is still within the TTL at `now`.
    ///
    /// An entry stamped in the future (the clock went backwards) is stale.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let age_ms = now.signed_duration_since(self.fetched_at).num_milliseconds();
        (0..CACHE_TTL.as_millis() as i64).contains(&age_ms)
    }
}

/// Cache of resolution results kept in the durable store.
///
/// Entries are never updated in place; `put` replaces the whole entry.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Store key for `id`.
    pub fn cache_key(id: &DocumentId) -> String {
        format!("{}{}", CACHE_PREFIX, id)
    }

    /// Get a fresh result for `id`.
    ///
    /// Stale or unreadable entries count as a miss and are dropped on a
    /// best-effort basis.
    pub async fn get(&self, id: &DocumentId) -> Result<Option<ResolutionResult>> {
        self.get_at(id, Utc::now()).await
    }

    async fn get_at(&self, id: &DocumentId, now: DateTime<Utc>) -> Result<Option<ResolutionResult>> {
        let key = Self::cache_key(id);
        let Some(value) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) if entry.is_fresh_at(now) => Ok(Some(entry.data)),
            Ok(_) => {
                tracing::debug!("Cache entry for {} expired", id);
                self.drop_quietly(&key).await;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry for {}: {}", id, e);
                self.drop_quietly(&key).await;
                Ok(None)
            }
        }
    }

    /// Cache `result` for `id`, replacing any previous entry.
    pub async fn put(&self, id: &DocumentId, result: &ResolutionResult) -> Result<()> {
        let entry = CacheEntry::new(result.clone());
        self.put_entry(id, &entry).await
    }

    /// Store a prepared entry.
    pub async fn put_entry(&self, id: &DocumentId, entry: &CacheEntry) -> Result<()> {
        let value = serde_json::to_value(entry)?;
        self.store.set(&Self::cache_key(id), value).await
    }

    /// Drop the entry for `id`. Returns whether one existed.
    pub async fn invalidate(&self, id: &DocumentId) -> Result<bool> {
        self.store.remove(&Self::cache_key(id)).await
    }

    /// Drop every cache entry, leaving other keys in the store untouched.
    ///
    /// Returns the number of entries removed.
    pub async fn invalidate_all(&self) -> Result<usize> {
        let removed = self.store.remove_prefixed(CACHE_PREFIX).await?;
        tracing::info!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    /// Number of entries currently stored, fresh or not.
    pub async fn len(&self) -> Result<usize> {
        Ok(self
            .store
            .keys()
            .await?
            .iter()
            .filter(|k| k.starts_with(CACHE_PREFIX))
            .count())
    }

    async fn drop_quietly(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            tracing::debug!("Could not drop cache entry {}: {}", key, e);
        }
    }
}
