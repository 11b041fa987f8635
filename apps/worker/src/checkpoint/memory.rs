//! In-memory checkpoint store
//!
//! Backs tests and dry runs with the same contract as the Postgres store.
//! All operations, including the composite lock steps, run under a single
//! mutex so acquisition is atomic within a process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{format_expiry, parse_expiry, CheckpointStore, LockAcquisition};
use crate::error::WorkerResult;

/// Mutex-protected map with the `CheckpointStore` contract
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries (for assertions in tests)
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.lock().await.clone()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, key: &str) -> WorkerResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> WorkerResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> WorkerResult<bool> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> WorkerResult<LockAcquisition> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();

        if let Some(value) = entries.get(key) {
            if let Some(expires_at) = parse_expiry(key, value) {
                if expires_at > now {
                    return Ok(LockAcquisition {
                        acquired: false,
                        expires_at,
                    });
                }
            }
        }

        let expires_at = now + ttl;
        entries.insert(key.to_string(), format_expiry(expires_at));
        Ok(LockAcquisition {
            acquired: true,
            expires_at,
        })
    }

    async fn refresh_lock(&self, key: &str, ttl: Duration) -> WorkerResult<DateTime<Utc>> {
        let expires_at = Utc::now() + ttl;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), format_expiry(expires_at));
        Ok(expires_at)
    }

    async fn release_lock(&self, key: &str) -> WorkerResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::keys;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryCheckpointStore::new();

        assert!(store.get("k").await.unwrap().is_none());

        store.put("k", "v1").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v1"));

        // Last writer wins
        store.put("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_exclusivity() {
        let store = MemoryCheckpointStore::new();

        let first = store
            .acquire_lock(keys::RESYNC_LOCK, Duration::minutes(10))
            .await
            .unwrap();
        assert!(first.acquired);

        let second = store
            .acquire_lock(keys::RESYNC_LOCK, Duration::minutes(10))
            .await
            .unwrap();
        assert!(!second.acquired);
        assert_eq!(second.expires_at, first.expires_at);
    }

    #[tokio::test]
    async fn test_lock_expires_without_refresh() {
        let store = MemoryCheckpointStore::new();

        let first = store
            .acquire_lock(keys::RESYNC_LOCK, Duration::zero())
            .await
            .unwrap();
        assert!(first.acquired);

        // TTL already elapsed, a new caller may proceed
        let second = store
            .acquire_lock(keys::RESYNC_LOCK, Duration::minutes(10))
            .await
            .unwrap();
        assert!(second.acquired);
    }

    #[tokio::test]
    async fn test_refresh_extends_expiry() {
        let store = MemoryCheckpointStore::new();

        let acquired = store
            .acquire_lock(keys::RESYNC_LOCK, Duration::minutes(1))
            .await
            .unwrap();
        assert!(acquired.acquired);

        let refreshed = store
            .refresh_lock(keys::RESYNC_LOCK, Duration::minutes(10))
            .await
            .unwrap();
        assert!(refreshed > acquired.expires_at);
    }

    #[tokio::test]
    async fn test_release_lets_next_caller_in() {
        let store = MemoryCheckpointStore::new();

        store
            .acquire_lock(keys::RESYNC_LOCK, Duration::minutes(10))
            .await
            .unwrap();
        store.release_lock(keys::RESYNC_LOCK).await.unwrap();

        let next = store
            .acquire_lock(keys::RESYNC_LOCK, Duration::minutes(10))
            .await
            .unwrap();
        assert!(next.acquired);
    }

    #[tokio::test]
    async fn test_corrupt_lock_value_is_treated_as_expired() {
        let store = MemoryCheckpointStore::new();
        store.put(keys::RESYNC_LOCK, "garbage").await.unwrap();

        let acquisition = store
            .acquire_lock(keys::RESYNC_LOCK, Duration::minutes(10))
            .await
            .unwrap();
        assert!(acquisition.acquired);
    }
}
