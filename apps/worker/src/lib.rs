//! Collectarr background job processor
//!
//! The worker drains a Redis job queue and runs collection automation
//! against the configured media server. Its centerpiece is the one-time,
//! crash-safe collection resynchronization migration
//! ([`jobs::collection_resync`]), built on a shared retry primitive
//! ([`retry`]) and a durable checkpoint store ([`checkpoint`]).

pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod jobs;
pub mod recommend;
pub mod report;
pub mod retry;

use collectarr_plex_client::PlexClient;
use sqlx::PgPool;

pub use config::Config;

/// Shared application state for job dispatch
pub struct AppState {
    /// Postgres connection pool
    pub db: PgPool,

    /// Redis client for the job queue
    pub redis: redis::Client,

    /// Media server client, when configured
    pub plex: Option<PlexClient>,

    /// Worker configuration
    pub config: Config,
}
