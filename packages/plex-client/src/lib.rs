//! Plex media server API client for Collectarr
//!
//! This crate provides a narrow client for the parts of the Plex API that
//! collection automation needs: library sections, collections (list, find,
//! create, delete, children), home-screen promotion, and server accounts.
//!
//! # Retry policy
//!
//! Every method performs exactly one request. Callers that need retries wrap
//! calls in their own executor and use [`PlexError::is_retryable`] to decide
//! whether a failure is transient (timeouts, connection failures, 5xx) or
//! permanent (4xx, malformed responses).
//!
//! # Thread Safety
//!
//! `PlexClient` is `Clone + Send + Sync` and can be safely shared across
//! threads. It uses a shared HTTP client connection pool.
//!
//! # Example
//!
//! ```no_run
//! use collectarr_plex_client::PlexClient;
//! use collectarr_shared_config::PlexConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PlexConfig::new("http://plex:32400", "token");
//! let client = PlexClient::new(&config)?;
//!
//! for section in client.sections().await? {
//!     let collections = client.collections(section.id).await?;
//!     println!("{}: {} collections", section.title, collections.len());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod models;

pub use client::{PlexClient, PlexMediaType};
pub use error::{PlexError, PlexResult};
pub use models::{PlexAccount, PlexCollection, PlexSection};

/// The server owner's account id, by Plex convention
pub const OWNER_ACCOUNT_ID: i64 = 1;
