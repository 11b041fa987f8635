//! Worker configuration loaded from environment variables
//!
//! This module provides configuration management for the Collectarr worker
//! service. Configuration is loaded from environment variables with sensible
//! defaults for development environments.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use collectarr_shared_config::{CommonConfig, DatabaseConfig, Environment, PlexConfig, RedisConfig};

use crate::retry::RetryPolicy;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Job polling interval in seconds
    pub poll_interval_secs: u64,

    /// Maximum retry attempts for remote calls
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds
    pub retry_base_delay_ms: u64,

    /// Collection resynchronization settings
    pub resync: ResyncSettings,
}

/// Knobs for the collection resynchronization migration
#[derive(Debug, Clone)]
pub struct ResyncSettings {
    /// Maximum items per rebuilt collection
    pub max_collection_size: usize,

    /// Fixed pause between processed items in milliseconds
    pub pacing_ms: u64,

    /// Mutual-exclusion lock TTL in seconds
    pub lock_ttl_secs: i64,

    /// Migration release version recorded on completion
    pub version: String,

    /// Poster artwork URL for taste-family collections
    pub taste_poster_url: Option<String>,

    /// Poster artwork URL for watch-family collections
    pub watch_poster_url: Option<String>,
}

impl Default for ResyncSettings {
    fn default() -> Self {
        Self {
            max_collection_size: 50,
            pacing_ms: 500,
            lock_ttl_secs: 600,
            version: "1".to_string(),
            taste_poster_url: None,
            watch_poster_url: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            poll_interval_secs: env::var("WORKER_POLL_INTERVAL")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid WORKER_POLL_INTERVAL value")?,

            max_retries: env::var("WORKER_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("Invalid WORKER_MAX_RETRIES value")?,

            retry_base_delay_ms: env::var("WORKER_RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("Invalid WORKER_RETRY_BASE_DELAY_MS value")?,

            resync: ResyncSettings {
                max_collection_size: env::var("RESYNC_MAX_COLLECTION_SIZE")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .context("Invalid RESYNC_MAX_COLLECTION_SIZE value")?,

                pacing_ms: env::var("RESYNC_PACING_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .context("Invalid RESYNC_PACING_MS value")?,

                lock_ttl_secs: env::var("RESYNC_LOCK_TTL")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .context("Invalid RESYNC_LOCK_TTL value")?,

                version: env::var("RESYNC_VERSION").unwrap_or_else(|_| "1".to_string()),

                taste_poster_url: env::var("RESYNC_TASTE_POSTER_URL")
                    .ok()
                    .filter(|s| !s.is_empty()),

                watch_poster_url: env::var("RESYNC_WATCH_POSTER_URL")
                    .ok()
                    .filter(|s| !s.is_empty()),
            },
        })
    }

    /// Retry policy for remote calls, built from the configured knobs
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    // Convenience accessors for common config fields

    /// Get database URL
    pub fn database_url(&self) -> &str {
        &self.common.database.url
    }

    /// Get Redis URL
    pub fn redis_url(&self) -> &str {
        &self.common.redis.url
    }

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Get Redis configuration
    pub fn redis(&self) -> &RedisConfig {
        &self.common.redis
    }

    /// Get Plex configuration (if configured)
    pub fn plex(&self) -> Option<&PlexConfig> {
        self.common.plex.as_ref()
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if Plex integration is configured
    pub fn has_plex(&self) -> bool {
        self.common.has_plex()
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}
