//! Deterministic build of the target-collection queue
//!
//! Given the same local recommendation data, every invocation must produce
//! the same queue items in the same order, so a crash-and-resume lands on
//! the same plan. Ordering is the lexicographic sort by
//! `(owner_id, media_kind, section_id, base_name)`, never insertion order.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::catalog::{PlacementHints, UserDirectory};
use crate::config::ResyncSettings;
use crate::error::{WorkerError, WorkerResult};
use crate::recommend::{CollectionFamily, RecommendationSource};
use crate::retry::{self, RetryPolicy};

use super::state::{QueueItem, ResyncState};

/// Final display name for one owner's collection
pub fn compose_display_name(base_name: &str, owner_title: &str) -> String {
    format!("{} ({})", base_name, owner_title)
}

/// Resolve the remote user directory into `(admin id, id -> display name)`
pub async fn resolve_users(
    users: &dyn UserDirectory,
    policy: RetryPolicy,
) -> WorkerResult<(i64, BTreeMap<i64, String>)> {
    let accounts = retry::run("list remote users", policy, || users.list_users()).await?;

    let admin_user_id = accounts
        .iter()
        .find(|u| u.is_admin)
        .map(|u| u.id)
        .ok_or_else(|| {
            WorkerError::Configuration("remote user directory has no admin account".to_string())
        })?;

    let titles = accounts.into_iter().map(|u| (u.id, u.title)).collect();
    Ok((admin_user_id, titles))
}

/// Build the queue from the local recommendation tables
///
/// Groups without a resolvable owner are skipped (the owner left the server);
/// groups whose active count is zero stay in the queue and become
/// `skipped_empty` during the rebuild.
pub async fn build_queue(
    recommendations: &dyn RecommendationSource,
    admin_user_id: i64,
    user_titles: &BTreeMap<i64, String>,
    settings: &ResyncSettings,
) -> WorkerResult<Vec<QueueItem>> {
    let groups = recommendations.group_counts().await?;
    debug!(groups = groups.len(), "Scanned recommendation tables");

    let mut items = Vec::with_capacity(groups.len());
    for group in groups {
        let Some(owner_title) = user_titles.get(&group.owner_id) else {
            warn!(
                owner_id = group.owner_id,
                source = ?group.source,
                "Skipping group with no matching remote user"
            );
            continue;
        };

        let family = group.source.family();
        let base_name = family.base_name().to_string();
        let display_name = compose_display_name(&base_name, owner_title);
        let is_admin = group.owner_id == admin_user_id;

        items.push(QueueItem {
            owner_id: group.owner_id,
            media_kind: group.source.media_kind(),
            section_id: group.section_id,
            base_name,
            display_name,
            source: group.source,
            total_rows: group.total_rows,
            active_rows: group.active_rows,
            placement: PlacementHints {
                promote_owner_home: is_admin,
                promote_shared_home: !is_admin,
                poster_url: poster_for(family, settings),
            },
        });
    }

    sort_queue(&mut items);

    info!(items = items.len(), "Built target collection queue");
    Ok(items)
}

/// The canonical queue ordering, reproduced identically across runs
pub fn sort_queue(items: &mut [QueueItem]) {
    items.sort_by(|a, b| {
        (a.owner_id, a.media_kind.as_str(), a.section_id, a.base_name.as_str()).cmp(&(
            b.owner_id,
            b.media_kind.as_str(),
            b.section_id,
            b.base_name.as_str(),
        ))
    });
}

/// Re-resolve display names on an existing queue without rebuilding it
///
/// Item identities and progress are preserved; only the desired remote name
/// follows the owner's current display name. Owners missing from the
/// directory keep their stored name.
pub fn refresh_display_names(state: &mut ResyncState, user_titles: &BTreeMap<i64, String>) {
    for item in &mut state.queue {
        match user_titles.get(&item.owner_id) {
            Some(owner_title) => {
                let fresh = compose_display_name(&item.base_name, owner_title);
                if fresh != item.display_name {
                    info!(
                        key = %item.key(),
                        old = %item.display_name,
                        new = %fresh,
                        "Owner display name changed, updating target name"
                    );
                    item.display_name = fresh;
                }
            }
            None => {
                warn!(
                    key = %item.key(),
                    "Owner missing from remote directory, keeping stored display name"
                );
            }
        }
    }
}

fn poster_for(family: CollectionFamily, settings: &ResyncSettings) -> Option<String> {
    match family {
        CollectionFamily::Taste => settings.taste_poster_url.clone(),
        CollectionFamily::Watch => settings.watch_poster_url.clone(),
    }
}
