//! Shared test utilities for the Collectarr workspace
//!
//! Provides mock implementations of external services for testing jobs
//! without network dependencies.

mod plex;

pub use plex::{CollectionFixture, MockPlexServer, SectionFixture};
