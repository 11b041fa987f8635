//! Durable key/value checkpoint storage
//!
//! One logical row per key with last-writer-wins upserts. On top of the plain
//! rows, a well-known key holding an expiry timestamp provides advisory,
//! single-writer mutual exclusion: acquisition succeeds only while no
//! unexpired value exists, and a holder that dies simply lets the value
//! expire. This is not a fencing or consensus lock - concurrent acquisition
//! attempts are safe to retry and at most one of them observes `acquired`.

mod memory;
mod postgres;

pub use memory::MemoryCheckpointStore;
pub use postgres::PgCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::warn;

use crate::error::WorkerResult;

/// Well-known checkpoint keys used by the collection resync migration
pub mod keys {
    /// The versioned working-state document (JSON)
    pub const RESYNC_STATE: &str = "collection_resync.state";
    /// Mutual-exclusion lock expiry (RFC 3339 timestamp)
    pub const RESYNC_LOCK: &str = "collection_resync.lock_until";
    /// Permanent completion marker (RFC 3339 timestamp)
    pub const RESYNC_COMPLETED_AT: &str = "collection_resync.completed_at";
    /// JSON map of release version to completion timestamp
    pub const RESYNC_COMPLETED_VERSIONS: &str = "collection_resync.completed_versions";
}

/// Outcome of a lock acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockAcquisition {
    /// Whether this caller now holds the lock
    pub acquired: bool,

    /// When the lock expires (the current holder's expiry when not acquired)
    pub expires_at: DateTime<Utc>,
}

/// Serialize a lock expiry so stored values order lexicographically
pub(crate) fn format_expiry(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored lock expiry; unparsable values are treated as expired
pub(crate) fn parse_expiry(key: &str, value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(key, value, error = %e, "Unparsable lock expiry, treating as expired");
            None
        }
    }
}

/// Durable key/value storage with advisory TTL locking
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> WorkerResult<Option<String>>;

    /// Write a value (upsert, last-writer-wins)
    async fn put(&self, key: &str, value: &str) -> WorkerResult<()>;

    /// Remove a value; returns whether a row existed
    async fn delete(&self, key: &str) -> WorkerResult<bool>;

    /// Try to acquire the lock stored under `key` for `ttl`
    ///
    /// Succeeds only if no unexpired expiry is stored. Losing a race reports
    /// `acquired: false`, never an error.
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> WorkerResult<LockAcquisition> {
        let now = Utc::now();

        if let Some(value) = self.get(key).await? {
            if let Some(expires_at) = parse_expiry(key, &value) {
                if expires_at > now {
                    return Ok(LockAcquisition {
                        acquired: false,
                        expires_at,
                    });
                }
            }
        }

        let expires_at = now + ttl;
        self.put(key, &format_expiry(expires_at)).await?;
        Ok(LockAcquisition {
            acquired: true,
            expires_at,
        })
    }

    /// Extend the held lock by `ttl` from now
    ///
    /// Must be called by the holder after every state-mutating step, not on a
    /// separate timer, so a dead holder stops refreshing and the lock
    /// self-expires.
    async fn refresh_lock(&self, key: &str, ttl: Duration) -> WorkerResult<DateTime<Utc>> {
        let expires_at = Utc::now() + ttl;
        self.put(key, &format_expiry(expires_at)).await?;
        Ok(expires_at)
    }

    /// Release the lock
    async fn release_lock(&self, key: &str) -> WorkerResult<()> {
        self.delete(key).await?;
        Ok(())
    }
}
