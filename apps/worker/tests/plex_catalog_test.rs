//! Adapter tests: the real Plex client behind the catalog traits
//!
//! Drives `PlexClient` through the `LibraryCatalog` / `UserDirectory`
//! adapters against a mock Plex server, covering the wire-to-domain mapping
//! the migration relies on.

use collectarr_plex_client::PlexClient;
use collectarr_shared_config::PlexConfig;
use collectarr_test_utils::{CollectionFixture, MockPlexServer, SectionFixture};
use collectarr_worker::catalog::{
    DeleteOutcome, LibraryCatalog, MediaKind, PlacementHints, UserDirectory,
};

async fn client_for(server: &MockPlexServer) -> PlexClient {
    PlexClient::new(&PlexConfig::new(server.url(), server.token())).unwrap()
}

#[tokio::test]
async fn test_sections_filter_out_unsupported_kinds() {
    let server = MockPlexServer::start().await;
    server
        .mock_sections(vec![
            SectionFixture::movies(1, "Movies"),
            SectionFixture::shows(2, "TV Shows"),
            SectionFixture {
                id: 3,
                title: "Music".to_string(),
                kind: "artist".to_string(),
            },
        ])
        .await;

    let client = client_for(&server).await;
    let sections = LibraryCatalog::list_sections(&client).await.unwrap();

    // The music section has no media kind and is dropped
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].kind, MediaKind::Movie);
    assert_eq!(sections[1].kind, MediaKind::Tv);
}

#[tokio::test]
async fn test_list_collections_maps_summaries() {
    let server = MockPlexServer::start().await;
    server
        .mock_collections(
            1,
            vec![
                CollectionFixture::new(100, "Inspired by your Immaculate Taste (admin)"),
                CollectionFixture::new(101, "Marvel Cinematic Universe"),
            ],
        )
        .await;

    let client = client_for(&server).await;
    let collections = LibraryCatalog::list_collections(&client, 1).await.unwrap();

    assert_eq!(collections.len(), 2);
    assert_eq!(collections[0].id, 100);
    assert_eq!(
        collections[0].title,
        "Inspired by your Immaculate Taste (admin)"
    );
}

#[tokio::test]
async fn test_delete_outcome_mapping() {
    let server = MockPlexServer::start().await;
    server.mock_delete_collection(100).await;
    server.mock_delete_collection_not_found(101).await;

    let client = client_for(&server).await;

    assert_eq!(
        LibraryCatalog::delete_collection(&client, 100).await.unwrap(),
        DeleteOutcome::Deleted
    );
    // Absence is an outcome, not an error
    assert_eq!(
        LibraryCatalog::delete_collection(&client, 101).await.unwrap(),
        DeleteOutcome::NotFound
    );
}

#[tokio::test]
async fn test_create_collection_creates_and_promotes() {
    let server = MockPlexServer::start().await;
    server.mock_identity("machine-1").await;
    server
        .mock_create_collection("Inspired by your Immaculate Taste (admin)", 200)
        .await;
    server.mock_promote(1).await;

    let client = client_for(&server).await;
    let hints = PlacementHints {
        promote_owner_home: true,
        promote_shared_home: false,
        poster_url: None,
    };

    LibraryCatalog::create_collection(
        &client,
        1,
        MediaKind::Movie,
        "Inspired by your Immaculate Taste (admin)",
        &[10, 11, 12],
        &hints,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_collection_items_preserve_display_order() {
    let server = MockPlexServer::start().await;
    server.mock_collection_children(200, &[12, 10, 11]).await;

    let client = client_for(&server).await;
    let items = LibraryCatalog::collection_items(&client, 200).await.unwrap();

    assert_eq!(items, vec![12, 10, 11]);
}

#[tokio::test]
async fn test_user_directory_marks_owner_as_admin() {
    let server = MockPlexServer::start().await;
    server.mock_accounts(&[(1, "admin"), (7, "friend1")]).await;

    let client = client_for(&server).await;
    let users = UserDirectory::list_users(&client).await.unwrap();

    assert_eq!(users.len(), 2);
    assert!(users[0].is_admin);
    assert_eq!(users[0].title, "admin");
    assert!(!users[1].is_admin);
    assert_eq!(users[1].title, "friend1");
}
