//! Plex media server configuration types

use crate::{get_required_env, parse_env, ConfigError, ConfigResult};
use std::env;

/// Plex media server configuration
#[derive(Debug, Clone)]
pub struct PlexConfig {
    /// Plex server URL
    pub url: String,

    /// Plex authentication token
    pub token: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl PlexConfig {
    /// Load Plex configuration from environment variables
    ///
    /// Returns an error if the required variables (URL and token) are not set.
    /// This allows consumers to call `.ok()` to get `Option<PlexConfig>`.
    pub fn from_env() -> ConfigResult<Self> {
        let url = get_required_env("PLEX_URL")?;
        let token = get_required_env("PLEX_TOKEN")?;

        // Validate that URL is not empty
        if url.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "PLEX_URL".to_string(),
                "URL cannot be empty".to_string(),
            ));
        }

        // Validate that token is not empty
        if token.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "PLEX_TOKEN".to_string(),
                "token cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            url,
            token,
            timeout_secs: parse_env("PLEX_TIMEOUT", 30)?,
        })
    }

    /// Check if Plex is configured (both URL and token are set)
    pub fn is_configured() -> bool {
        env::var("PLEX_URL").is_ok() && env::var("PLEX_TOKEN").is_ok()
    }

    /// Create a configuration with custom URL and token (useful for testing)
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            timeout_secs: 30,
        }
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        let base = self.url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Get headers required for Plex API requests
    pub fn api_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("X-Plex-Token", self.token.clone()),
            ("Accept", "application/json".to_string()),
        ]
    }
}
