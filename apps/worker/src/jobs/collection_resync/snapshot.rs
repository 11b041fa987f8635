//! Pre-deletion inventory capture
//!
//! Before anything is deleted, every remote collection in every section is
//! recorded, and a naming-convention recognizer classifies which ones this
//! application owns. Capture happens exactly once per migration attempt -
//! re-capturing after partial progress would corrupt the "before" picture
//! the audit trail depends on.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{info, warn};

use crate::catalog::LibraryCatalog;
use crate::error::WorkerResult;
use crate::recommend::CollectionFamily;
use crate::retry::{self, RetryPolicy};

use super::state::{
    DeleteCandidate, LibrarySnapshot, RecognizedOwnership, RemoteCollectionRecord, ResyncState,
    SectionInventory,
};

/// Classify a remote collection title against the naming convention
///
/// Application-owned names have the shape `"{base} ({owner})"`. The owner
/// suffix is checked against current display names first, then against the
/// titles captured before the identity refresh, so collections named before
/// the migration started are still recognized as ours.
pub fn recognize_collection(
    title: &str,
    current_titles: &BTreeMap<i64, String>,
    pre_refresh_titles: &BTreeMap<i64, String>,
) -> Option<RecognizedOwnership> {
    for family in [CollectionFamily::Taste, CollectionFamily::Watch] {
        let base = family.base_name();
        let Some(rest) = title.strip_prefix(base) else {
            continue;
        };
        let Some(owner_title) = rest.strip_prefix(" (").and_then(|s| s.strip_suffix(')')) else {
            continue;
        };
        if owner_title.is_empty() {
            continue;
        }

        let is_current = current_titles.values().any(|t| t == owner_title);
        let is_pre_refresh = pre_refresh_titles.values().any(|t| t == owner_title);

        return Some(RecognizedOwnership {
            family,
            owner_title: owner_title.to_string(),
            pre_migration: !is_current && is_pre_refresh,
        });
    }

    None
}

/// Capture the remote inventory and derive the delete queue
///
/// No-op when a snapshot is already present. The caller persists the state
/// afterwards.
pub async fn capture_snapshot(
    catalog: &dyn LibraryCatalog,
    state: &mut ResyncState,
    current_titles: &BTreeMap<i64, String>,
    policy: RetryPolicy,
) -> WorkerResult<()> {
    if state.snapshot.is_some() {
        info!("Snapshot already captured, skipping");
        return Ok(());
    }

    let sections = retry::run("list library sections", policy, || catalog.list_sections()).await?;

    let mut inventories = Vec::with_capacity(sections.len());
    let mut candidates = Vec::new();

    for section in &sections {
        let collections = retry::run("list section collections", policy, || {
            catalog.list_collections(section.id)
        })
        .await?;

        let mut records = Vec::with_capacity(collections.len());
        for collection in collections {
            let recognized = recognize_collection(
                &collection.title,
                current_titles,
                &state.pre_refresh_user_titles,
            );

            if let Some(ownership) = &recognized {
                if ownership.pre_migration {
                    info!(
                        title = %collection.title,
                        owner = %ownership.owner_title,
                        "Recognized collection named before the identity refresh"
                    );
                }
                candidates.push(DeleteCandidate {
                    section_id: section.id,
                    collection_id: collection.id,
                    title: collection.title.clone(),
                    section_title: section.title.clone(),
                });
            }

            records.push(RemoteCollectionRecord {
                collection_id: collection.id,
                title: collection.title,
                recognized,
            });
        }

        inventories.push(SectionInventory {
            section_id: section.id,
            section_title: section.title.clone(),
            media_kind: section.kind,
            collections: records,
        });
    }

    candidates.sort_by(|a, b| {
        (a.section_id, a.title.as_str()).cmp(&(b.section_id, b.title.as_str()))
    });

    cross_check(state, &candidates);

    info!(
        sections = inventories.len(),
        owned = candidates.len(),
        "Captured pre-delete inventory"
    );

    state.snapshot = Some(LibrarySnapshot {
        taken_at: Utc::now(),
        sections: inventories,
    });
    state.delete_queue = candidates;
    state.phases.captured_at = Some(Utc::now());

    Ok(())
}

/// Compare the queue's expectations against what the inventory found
fn cross_check(state: &ResyncState, candidates: &[DeleteCandidate]) {
    let targets_with_rows = state.queue.iter().filter(|i| i.active_rows > 0).count();

    info!(
        queue_targets = state.queue.len(),
        targets_with_rows,
        recognized_remote = candidates.len(),
        "Cross-checking queue targets against remote inventory"
    );

    for item in &state.queue {
        if item.active_rows == 0 && item.total_rows > 0 {
            warn!(
                key = %item.key(),
                total_rows = item.total_rows,
                "Queue target has rows but none are active; rebuild will be skipped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current() -> BTreeMap<i64, String> {
        [(1, "admin".to_string()), (7, "frank".to_string())]
            .into_iter()
            .collect()
    }

    fn pre_refresh() -> BTreeMap<i64, String> {
        [(1, "admin".to_string()), (7, "friend1".to_string())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_recognizes_current_owner() {
        let recognized = recognize_collection(
            "Inspired by your Immaculate Taste (admin)",
            &current(),
            &pre_refresh(),
        )
        .unwrap();

        assert_eq!(recognized.family, CollectionFamily::Taste);
        assert_eq!(recognized.owner_title, "admin");
        assert!(!recognized.pre_migration);
    }

    #[test]
    fn test_recognizes_pre_migration_name() {
        // friend1 renamed to frank after this collection was created
        let recognized = recognize_collection(
            "Based on your recently watched (friend1)",
            &current(),
            &pre_refresh(),
        )
        .unwrap();

        assert_eq!(recognized.family, CollectionFamily::Watch);
        assert_eq!(recognized.owner_title, "friend1");
        assert!(recognized.pre_migration);
    }

    #[test]
    fn test_foreign_collections_are_not_recognized() {
        assert!(recognize_collection("Marvel Cinematic Universe", &current(), &pre_refresh())
            .is_none());
        assert!(recognize_collection("Inspired by your Immaculate Taste", &current(), &pre_refresh())
            .is_none());
        assert!(recognize_collection(
            "Inspired by your Immaculate Taste ()",
            &current(),
            &pre_refresh()
        )
        .is_none());
        assert!(recognize_collection(
            "Inspired by your Immaculate Tasteful picks (admin)",
            &current(),
            &pre_refresh()
        )
        .is_none());
    }

    #[test]
    fn test_unknown_owner_suffix_still_owned() {
        // The base prefix marks it ours even if the owner is long gone
        let recognized = recognize_collection(
            "Inspired by your Immaculate Taste (ghost)",
            &current(),
            &pre_refresh(),
        )
        .unwrap();

        assert_eq!(recognized.owner_title, "ghost");
        assert!(!recognized.pre_migration);
    }
}
