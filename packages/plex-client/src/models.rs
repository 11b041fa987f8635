//! Wire types for Plex API responses
//!
//! Plex wraps every payload in a `MediaContainer` envelope and is inconsistent
//! about numeric fields: `ratingKey` and section `key` arrive as JSON strings.
//! The deserializers here accept both forms.

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Deserialize an i64 that may arrive as a JSON number or a string
pub(crate) fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid numeric id: {:?}", s))),
    }
}

/// `GET /library/sections` response
#[derive(Debug, Deserialize)]
pub struct SectionsResponse {
    #[serde(rename = "MediaContainer")]
    pub media_container: SectionsContainer,
}

#[derive(Debug, Deserialize)]
pub struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    pub directories: Vec<SectionDirectory>,
}

/// One library section directory entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDirectory {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub key: i64,
    pub title: String,
    /// Section content type: "movie", "show", "artist", ...
    #[serde(rename = "type")]
    pub kind: String,
}

/// Collection listing / children response
#[derive(Debug, Deserialize)]
pub struct MetadataResponse {
    #[serde(rename = "MediaContainer")]
    pub media_container: MetadataContainer,
}

#[derive(Debug, Deserialize)]
pub struct MetadataContainer {
    #[serde(rename = "Metadata", default)]
    pub metadata: Vec<MetadataItem>,
}

/// One metadata entry (a collection or a library item)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataItem {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub rating_key: i64,
    pub title: String,
}

/// `GET /accounts` response
#[derive(Debug, Deserialize)]
pub struct AccountsResponse {
    #[serde(rename = "MediaContainer")]
    pub media_container: AccountsContainer,
}

#[derive(Debug, Deserialize)]
pub struct AccountsContainer {
    #[serde(rename = "Account", default)]
    pub accounts: Vec<AccountEntry>,
}

/// One server account entry
#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntry {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: i64,
    pub name: String,
}

/// `GET /identity` response
#[derive(Debug, Deserialize)]
pub struct IdentityResponse {
    #[serde(rename = "MediaContainer")]
    pub media_container: IdentityContainer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContainer {
    pub machine_identifier: String,
}

/// A library section, with ids parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlexSection {
    pub id: i64,
    pub title: String,
    pub kind: String,
}

/// A collection as listed in a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlexCollection {
    pub id: i64,
    pub title: String,
}

/// A server account (owner and home/shared users)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlexAccount {
    pub id: i64,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_key_as_string() {
        let json = r#"{"ratingKey": "12345", "title": "Heat"}"#;
        let item: MetadataItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.rating_key, 12345);
        assert_eq!(item.title, "Heat");
    }

    #[test]
    fn test_rating_key_as_number() {
        let json = r#"{"ratingKey": 12345, "title": "Heat"}"#;
        let item: MetadataItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.rating_key, 12345);
    }

    #[test]
    fn test_rating_key_invalid_string() {
        let json = r#"{"ratingKey": "abc", "title": "Heat"}"#;
        let result: Result<MetadataItem, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_sections_envelope() {
        let json = r#"{
            "MediaContainer": {
                "Directory": [
                    {"key": "1", "title": "Movies", "type": "movie"},
                    {"key": "2", "title": "TV Shows", "type": "show"}
                ]
            }
        }"#;
        let response: SectionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.media_container.directories.len(), 2);
        assert_eq!(response.media_container.directories[0].key, 1);
        assert_eq!(response.media_container.directories[1].kind, "show");
    }

    #[test]
    fn test_empty_collection_listing() {
        // Plex omits Metadata entirely when a section has no collections
        let json = r#"{"MediaContainer": {"size": 0}}"#;
        let response: MetadataResponse = serde_json::from_str(json).unwrap();
        assert!(response.media_container.metadata.is_empty());
    }

    #[test]
    fn test_accounts_envelope() {
        let json = r#"{
            "MediaContainer": {
                "Account": [
                    {"id": 1, "name": "admin"},
                    {"id": 2, "name": "friend1"}
                ]
            }
        }"#;
        let response: AccountsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.media_container.accounts.len(), 2);
        assert_eq!(response.media_container.accounts[0].name, "admin");
    }
}
