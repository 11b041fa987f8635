//! Remote library collaborator interfaces
//!
//! The engine talks to the media server through these narrow traits so the
//! migration can be exercised against in-memory fakes and the HTTP client
//! stays replaceable. "Absence is expected" outcomes are visible in the
//! types (`DeleteOutcome`, `Option` lookups) rather than inferred from
//! errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use collectarr_plex_client::{PlexClient, PlexMediaType, OWNER_ACCOUNT_ID};

use crate::error::{WorkerError, WorkerResult};

/// Kind of media a section or collection holds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    /// Map a remote section content type ("movie", "show", ...) to a kind
    ///
    /// Returns `None` for section types collection automation does not
    /// cover (music, photos).
    pub fn from_section_type(section_type: &str) -> Option<Self> {
        match section_type {
            "movie" => Some(Self::Movie),
            "show" => Some(Self::Tv),
            _ => None,
        }
    }

    /// Stable lowercase name, used in item keys and sort order
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote library section the acting user can see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: i64,
    pub title: String,
    pub kind: MediaKind,
}

/// A remote collection as listed in a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub id: i64,
    pub title: String,
}

/// Result of a delete call; the entity's absence satisfies the intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Home-screen placement and artwork applied to a rebuilt collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementHints {
    /// Pin to the owner's home screen (the admin's collections)
    pub promote_owner_home: bool,

    /// Pin to shared users' home rows (other owners' collections)
    pub promote_shared_home: bool,

    /// Poster artwork to apply, when configured for the collection family
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
}

/// A known remote user account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
    pub id: i64,
    pub title: String,
    pub is_admin: bool,
}

/// Remote collection catalog operations the migration needs
#[async_trait]
pub trait LibraryCatalog: Send + Sync {
    /// List library sections (movie and TV sections only)
    async fn list_sections(&self) -> WorkerResult<Vec<Section>>;

    /// List every collection in a section
    async fn list_collections(&self, section_id: i64) -> WorkerResult<Vec<CollectionSummary>>;

    /// Delete a collection by id; absence is reported, not raised
    async fn delete_collection(&self, collection_id: i64) -> WorkerResult<DeleteOutcome>;

    /// Find a collection by exact name
    async fn find_collection_by_name(
        &self,
        section_id: i64,
        name: &str,
    ) -> WorkerResult<Option<CollectionSummary>>;

    /// Create a collection with the exact item order and placement given
    async fn create_collection(
        &self,
        section_id: i64,
        kind: MediaKind,
        name: &str,
        ordered_item_ids: &[i64],
        hints: &PlacementHints,
    ) -> WorkerResult<()>;

    /// List a collection's item ids in display order
    async fn collection_items(&self, collection_id: i64) -> WorkerResult<Vec<i64>>;
}

/// Remote identity lookup for owner display names
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// List known user accounts with their current display names
    async fn list_users(&self) -> WorkerResult<Vec<RemoteUser>>;
}

impl From<MediaKind> for PlexMediaType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Movie => PlexMediaType::Movie,
            MediaKind::Tv => PlexMediaType::Show,
        }
    }
}

#[async_trait]
impl LibraryCatalog for PlexClient {
    async fn list_sections(&self) -> WorkerResult<Vec<Section>> {
        let sections = self.sections().await.map_err(WorkerError::from)?;
        Ok(sections
            .into_iter()
            .filter_map(|s| {
                MediaKind::from_section_type(&s.kind).map(|kind| Section {
                    id: s.id,
                    title: s.title,
                    kind,
                })
            })
            .collect())
    }

    async fn list_collections(&self, section_id: i64) -> WorkerResult<Vec<CollectionSummary>> {
        let collections = self
            .collections(section_id)
            .await
            .map_err(WorkerError::from)?;
        Ok(collections
            .into_iter()
            .map(|c| CollectionSummary {
                id: c.id,
                title: c.title,
            })
            .collect())
    }

    async fn delete_collection(&self, collection_id: i64) -> WorkerResult<DeleteOutcome> {
        let deleted = PlexClient::delete_collection(self, collection_id)
            .await
            .map_err(WorkerError::from)?;
        Ok(if deleted {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn find_collection_by_name(
        &self,
        section_id: i64,
        name: &str,
    ) -> WorkerResult<Option<CollectionSummary>> {
        let found = self
            .find_collection(section_id, name)
            .await
            .map_err(WorkerError::from)?;
        Ok(found.map(|c| CollectionSummary {
            id: c.id,
            title: c.title,
        }))
    }

    async fn create_collection(
        &self,
        section_id: i64,
        kind: MediaKind,
        name: &str,
        ordered_item_ids: &[i64],
        hints: &PlacementHints,
    ) -> WorkerResult<()> {
        let created = PlexClient::create_collection(self, section_id, kind.into(), name, ordered_item_ids)
            .await
            .map_err(WorkerError::from)?;

        self.promote_collection(
            section_id,
            created.id,
            hints.promote_owner_home,
            hints.promote_shared_home,
        )
        .await
        .map_err(WorkerError::from)?;

        if let Some(poster_url) = &hints.poster_url {
            self.set_collection_poster(created.id, poster_url)
                .await
                .map_err(WorkerError::from)?;
        }

        Ok(())
    }

    async fn collection_items(&self, collection_id: i64) -> WorkerResult<Vec<i64>> {
        PlexClient::collection_items(self, collection_id)
            .await
            .map_err(WorkerError::from)
    }
}

#[async_trait]
impl UserDirectory for PlexClient {
    async fn list_users(&self) -> WorkerResult<Vec<RemoteUser>> {
        let accounts = self.accounts().await.map_err(WorkerError::from)?;
        Ok(accounts
            .into_iter()
            .map(|a| RemoteUser {
                id: a.id,
                is_admin: a.id == OWNER_ACCOUNT_ID,
                title: a.name,
            })
            .collect())
    }
}
