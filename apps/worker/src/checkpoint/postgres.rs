//! Postgres-backed checkpoint store
//!
//! One row per key in the `app_state` table:
//!
//! ```sql
//! CREATE TABLE app_state (
//!     key        TEXT PRIMARY KEY,
//!     value      TEXT NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! Lock acquisition is a single conditional upsert so racing processes
//! resolve on the database, not in application memory.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use super::{format_expiry, parse_expiry, CheckpointStore, LockAcquisition};
use crate::error::WorkerResult;

/// Checkpoint store over a shared Postgres pool
#[derive(Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    /// Create a new store over the given pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn get(&self, key: &str) -> WorkerResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_state WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> WorkerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_state (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> WorkerResult<bool> {
        let result = sqlx::query("DELETE FROM app_state WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> WorkerResult<LockAcquisition> {
        let now = Utc::now();
        let expires_at = now + ttl;

        // Stored expiries are fixed-width RFC 3339 strings, so the string
        // comparison below orders the same way the timestamps do. The WHERE
        // clause makes the takeover conditional: the upsert only replaces an
        // expired value, and inserting a fresh row always succeeds.
        let result = sqlx::query(
            r#"
            INSERT INTO app_state (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()
            WHERE app_state.value <= $3
            "#,
        )
        .bind(key)
        .bind(format_expiry(expires_at))
        .bind(format_expiry(now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(LockAcquisition {
                acquired: true,
                expires_at,
            });
        }

        // Lost the race - report the holder's expiry
        let holder_expiry = self
            .get(key)
            .await?
            .and_then(|value| parse_expiry(key, &value))
            .unwrap_or(expires_at);

        Ok(LockAcquisition {
            acquired: false,
            expires_at: holder_expiry,
        })
    }
}
