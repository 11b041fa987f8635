//! Core Plex HTTP client with connection pooling
//!
//! Every method performs a single request/response round trip; retry policy is
//! owned by the caller, which classifies failures through
//! [`PlexError::is_retryable`].

use std::time::Duration;

use collectarr_shared_config::PlexConfig;
use reqwest::{Client, Method, Response, StatusCode};
use tracing::debug;

use crate::error::{PlexError, PlexResult};
use crate::models::{
    AccountsResponse, IdentityResponse, MetadataResponse, PlexAccount, PlexCollection,
    PlexSection, SectionsResponse,
};

/// Maximum error body size to prevent memory exhaustion
const MAX_ERROR_BODY_SIZE: usize = 1000;

/// Plex collection content type codes, as the `/library/collections` endpoint
/// expects them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlexMediaType {
    Movie,
    Show,
}

impl PlexMediaType {
    /// Numeric type code used in collection create requests
    pub fn code(&self) -> u8 {
        match self {
            PlexMediaType::Movie => 1,
            PlexMediaType::Show => 2,
        }
    }
}

/// Plex API client with connection pooling
#[derive(Debug, Clone)]
pub struct PlexClient {
    /// HTTP client with connection pool
    http_client: Client,
    /// Configuration
    config: PlexConfig,
}

impl PlexClient {
    /// Create a new Plex client from configuration
    pub fn new(config: &PlexConfig) -> PlexResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(PlexError::HttpError)?;

        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    /// Create a client with a custom HTTP client (for testing)
    pub fn with_client(config: &PlexConfig, http_client: Client) -> Self {
        Self {
            http_client,
            config: config.clone(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &PlexConfig {
        &self.config
    }

    /// Truncate error body to prevent memory exhaustion
    /// Safely handles UTF-8 boundaries to avoid panics on multi-byte characters
    fn truncate_error_body(body: String) -> String {
        if body.len() <= MAX_ERROR_BODY_SIZE {
            return body;
        }

        let truncate_at = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
            .last()
            .unwrap_or(0);

        format!("{}... (truncated)", &body[..truncate_at])
    }

    /// Issue a request with the token and JSON accept headers attached
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> PlexResult<Response> {
        let url = self.config.api_url(path);

        let mut request = self.http_client.request(method, &url);
        for (name, value) in self.config.api_headers() {
            request = request.header(name, value);
        }
        if !query.is_empty() {
            request = request.query(query);
        }

        request.send().await.map_err(|e| {
            if e.is_connect() {
                PlexError::ConnectionRefused(self.config.url.clone())
            } else if e.is_timeout() {
                PlexError::Timeout(self.config.timeout_secs)
            } else {
                PlexError::HttpError(e)
            }
        })
    }

    /// Map a non-success status to the error taxonomy
    async fn check_status(response: Response) -> PlexResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(PlexError::Unauthorized);
        }

        let body = Self::truncate_error_body(response.text().await.unwrap_or_default());
        Err(PlexError::ApiError {
            status: status.as_u16(),
            body,
        })
    }

    /// Check if Plex is reachable and the token is valid
    pub async fn health_check(&self) -> PlexResult<bool> {
        let response = self.send(Method::GET, "identity", &[]).await?;
        Ok(response.status().is_success())
    }

    /// Get the server's machine identifier (needed for item URIs)
    pub async fn machine_identifier(&self) -> PlexResult<String> {
        let response = self.send(Method::GET, "identity", &[]).await?;
        let response = Self::check_status(response).await?;

        let identity: IdentityResponse = response.json().await?;
        Ok(identity.media_container.machine_identifier)
    }

    /// List all library sections
    pub async fn sections(&self) -> PlexResult<Vec<PlexSection>> {
        let response = self.send(Method::GET, "library/sections", &[]).await?;
        let response = Self::check_status(response).await?;

        let sections: SectionsResponse = response.json().await?;
        Ok(sections
            .media_container
            .directories
            .into_iter()
            .map(|d| PlexSection {
                id: d.key,
                title: d.title,
                kind: d.kind,
            })
            .collect())
    }

    /// List all collections in a section
    pub async fn collections(&self, section_id: i64) -> PlexResult<Vec<PlexCollection>> {
        let path = format!("library/sections/{}/collections", section_id);
        let response = self.send(Method::GET, &path, &[]).await?;
        let response = Self::check_status(response).await?;

        let listing: MetadataResponse = response.json().await?;
        Ok(listing
            .media_container
            .metadata
            .into_iter()
            .map(|m| PlexCollection {
                id: m.rating_key,
                title: m.title,
            })
            .collect())
    }

    /// Find a collection by exact title
    ///
    /// Plex's `title=` filter is a substring match, so the result is filtered
    /// down to an exact match here.
    pub async fn find_collection(
        &self,
        section_id: i64,
        title: &str,
    ) -> PlexResult<Option<PlexCollection>> {
        let path = format!("library/sections/{}/collections", section_id);
        let response = self
            .send(Method::GET, &path, &[("title", title.to_string())])
            .await?;
        let response = Self::check_status(response).await?;

        let listing: MetadataResponse = response.json().await?;
        Ok(listing
            .media_container
            .metadata
            .into_iter()
            .find(|m| m.title == title)
            .map(|m| PlexCollection {
                id: m.rating_key,
                title: m.title,
            }))
    }

    /// Delete a collection by id
    ///
    /// Returns `true` if the collection was deleted and `false` if it did not
    /// exist. Absence satisfies the intent of the call, so a 404 is not an
    /// error here.
    pub async fn delete_collection(&self, collection_id: i64) -> PlexResult<bool> {
        let path = format!("library/collections/{}", collection_id);
        let response = self.send(Method::DELETE, &path, &[]).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(collection_id, "Collection already absent on delete");
            return Ok(false);
        }

        Self::check_status(response).await?;
        Ok(true)
    }

    /// Create a collection with an explicit item order
    ///
    /// The item order in `item_ids` is the order Plex stores for the
    /// collection's custom sort.
    pub async fn create_collection(
        &self,
        section_id: i64,
        media_type: PlexMediaType,
        title: &str,
        item_ids: &[i64],
    ) -> PlexResult<PlexCollection> {
        if item_ids.is_empty() {
            return Err(PlexError::InvalidResponse(
                "cannot create a collection with no items".to_string(),
            ));
        }

        let machine_id = self.machine_identifier().await?;
        let keys: Vec<String> = item_ids.iter().map(|id| id.to_string()).collect();
        let uri = format!(
            "server://{}/com.plexapp.plugins.library/library/metadata/{}",
            machine_id,
            keys.join(",")
        );

        let response = self
            .send(
                Method::POST,
                "library/collections",
                &[
                    ("type", media_type.code().to_string()),
                    ("title", title.to_string()),
                    ("smart", "0".to_string()),
                    ("sectionId", section_id.to_string()),
                    ("uri", uri),
                ],
            )
            .await?;
        let response = Self::check_status(response).await?;

        let created: MetadataResponse = response.json().await?;
        let item = created
            .media_container
            .metadata
            .into_iter()
            .next()
            .ok_or_else(|| {
                PlexError::InvalidResponse("create returned no collection metadata".to_string())
            })?;

        debug!(collection_id = item.rating_key, title, "Collection created");

        Ok(PlexCollection {
            id: item.rating_key,
            title: item.title,
        })
    }

    /// List the item rating keys of a collection, in display order
    pub async fn collection_items(&self, collection_id: i64) -> PlexResult<Vec<i64>> {
        let path = format!("library/collections/{}/children", collection_id);
        let response = self.send(Method::GET, &path, &[]).await?;
        let response = Self::check_status(response).await?;

        let listing: MetadataResponse = response.json().await?;
        Ok(listing
            .media_container
            .metadata
            .into_iter()
            .map(|m| m.rating_key)
            .collect())
    }

    /// Promote or demote a collection on the home screens
    pub async fn promote_collection(
        &self,
        section_id: i64,
        collection_id: i64,
        own_home: bool,
        shared_home: bool,
    ) -> PlexResult<()> {
        fn flag(on: bool) -> String {
            let value = if on { "1" } else { "0" };
            value.to_string()
        }
        let path = format!("hubs/sections/{}/manage", section_id);
        let response = self
            .send(
                Method::PUT,
                &path,
                &[
                    ("metadataItemId", collection_id.to_string()),
                    ("promotedToRecommended", "1".to_string()),
                    ("promotedToOwnHome", flag(own_home)),
                    ("promotedToSharedHome", flag(shared_home)),
                ],
            )
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    /// Set a collection's poster from a hosted image URL
    pub async fn set_collection_poster(
        &self,
        collection_id: i64,
        poster_url: &str,
    ) -> PlexResult<()> {
        let path = format!("library/collections/{}/posters", collection_id);
        let response = self
            .send(Method::POST, &path, &[("url", poster_url.to_string())])
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    /// List server accounts (the owner plus home/shared users)
    ///
    /// Account id 1 is the server owner by Plex convention.
    pub async fn accounts(&self) -> PlexResult<Vec<PlexAccount>> {
        let response = self.send(Method::GET, "accounts", &[]).await?;
        let response = Self::check_status(response).await?;

        let accounts: AccountsResponse = response.json().await?;
        Ok(accounts
            .media_container
            .accounts
            .into_iter()
            .map(|a| PlexAccount {
                id: a.id,
                name: a.name,
            })
            .collect())
    }
}
