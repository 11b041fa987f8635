//! Mock Plex server for integration tests
//!
//! Provides wiremock-backed fixtures for the Plex endpoints the worker
//! touches, so jobs can be exercised without a live media server.

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock Plex server with fixture helpers
pub struct MockPlexServer {
    server: MockServer,
    token: String,
}

impl MockPlexServer {
    /// Start a new mock Plex server with the default token
    pub async fn start() -> Self {
        Self::start_with_token("test-token").await
    }

    /// Start a new mock Plex server with a custom token
    pub async fn start_with_token(token: &str) -> Self {
        let server = MockServer::start().await;
        Self {
            server,
            token: token.to_string(),
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get the token the server expects
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get a reference to the underlying mock server for custom mock setups
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Mount the `/identity` endpoint with a fixed machine identifier
    pub async fn mock_identity(&self, machine_id: &str) {
        Mock::given(method("GET"))
            .and(path("/identity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"machineIdentifier": machine_id}
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount the section listing
    pub async fn mock_sections(&self, sections: Vec<SectionFixture>) {
        let directories: Vec<serde_json::Value> =
            sections.into_iter().map(|s| s.to_json()).collect();

        Mock::given(method("GET"))
            .and(path("/library/sections"))
            .and(header("X-Plex-Token", self.token.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"Directory": directories}
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount the collection listing for one section
    pub async fn mock_collections(&self, section_id: i64, collections: Vec<CollectionFixture>) {
        let metadata: Vec<serde_json::Value> =
            collections.into_iter().map(|c| c.to_json()).collect();

        Mock::given(method("GET"))
            .and(path(format!("/library/sections/{}/collections", section_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"Metadata": metadata}
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a successful collection delete
    pub async fn mock_delete_collection(&self, collection_id: i64) {
        Mock::given(method("DELETE"))
            .and(path(format!("/library/collections/{}", collection_id)))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Mount a 404 for a collection delete (already gone)
    pub async fn mock_delete_collection_not_found(&self, collection_id: i64) {
        Mock::given(method("DELETE"))
            .and(path(format!("/library/collections/{}", collection_id)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
    }

    /// Mount a collection create returning the given new id
    pub async fn mock_create_collection(&self, title: &str, new_id: i64) {
        Mock::given(method("POST"))
            .and(path("/library/collections"))
            .and(query_param("title", title))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {
                    "Metadata": [{"ratingKey": new_id.to_string(), "title": title}]
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount the children listing for a collection
    pub async fn mock_collection_children(&self, collection_id: i64, item_ids: &[i64]) {
        let metadata: Vec<serde_json::Value> = item_ids
            .iter()
            .map(|id| json!({"ratingKey": id.to_string(), "title": format!("Item {}", id)}))
            .collect();

        Mock::given(method("GET"))
            .and(path(format!("/library/collections/{}/children", collection_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"Metadata": metadata}
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount the home-screen promotion endpoint for a section
    pub async fn mock_promote(&self, section_id: i64) {
        Mock::given(method("PUT"))
            .and(path(format!("/hubs/sections/{}/manage", section_id)))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Mount the server accounts listing
    pub async fn mock_accounts(&self, accounts: &[(i64, &str)]) {
        let entries: Vec<serde_json::Value> = accounts
            .iter()
            .map(|(id, name)| json!({"id": id, "name": name}))
            .collect();

        Mock::given(method("GET"))
            .and(path("/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"Account": entries}
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a server error on every library endpoint
    pub async fn mock_server_error(&self, error_message: &str) {
        Mock::given(method("GET"))
            .and(path("/library/sections"))
            .respond_with(ResponseTemplate::new(500).set_body_string(error_message.to_string()))
            .mount(&self.server)
            .await;
    }
}

/// Fixture for a library section
#[derive(Debug, Clone)]
pub struct SectionFixture {
    pub id: i64,
    pub title: String,
    pub kind: String,
}

impl SectionFixture {
    /// Create a movie section fixture
    pub fn movies(id: i64, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            kind: "movie".to_string(),
        }
    }

    /// Create a TV section fixture
    pub fn shows(id: i64, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            kind: "show".to_string(),
        }
    }

    /// Convert to the Plex directory JSON shape
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "key": self.id.to_string(),
            "title": self.title,
            "type": self.kind
        })
    }
}

/// Fixture for a collection entry
#[derive(Debug, Clone)]
pub struct CollectionFixture {
    pub id: i64,
    pub title: String,
}

impl CollectionFixture {
    /// Create a collection fixture
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
        }
    }

    /// Convert to the Plex metadata JSON shape
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "ratingKey": self.id.to_string(),
            "title": self.title
        })
    }
}
