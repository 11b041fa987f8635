//! The per-item migration state machine
//!
//! Items advance through strictly ordered phases, one remote-mutating step
//! at a time, with the working state persisted and the lock refreshed after
//! every transition. The loop re-reads the state document from the
//! checkpoint store before deriving each action - an in-memory copy is never
//! trusted across a persistence boundary.
//!
//! Work is sequential by design: the remote catalog is a single shared
//! resource that is sensitive to request bursts, and sequential processing
//! is what makes crash recovery reason-about-able. Items are separated by a
//! fixed pacing delay.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::catalog::DeleteOutcome;
use crate::checkpoint::keys;
use crate::context::JobContext;
use crate::error::{WorkerError, WorkerResult};
use crate::retry;

use super::state::{
    DeleteCandidate, FailureSource, ItemProgress, Phase, QueueItem, ResyncState,
};
use super::ResyncEnv;

/// Operator guidance attached to every retryable failure record
const RESTART_GUIDANCE: &str =
    "re-run the job once the underlying issue clears; it resumes from the last persisted phase";

/// The single next step derivable from a persisted state document
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    /// pending -> captured for a delete candidate (no remote call)
    IntakeDelete(DeleteCandidate),
    /// captured -> deleted: delete the remote collection by id
    DeleteRemote(DeleteCandidate),
    /// deleted -> done for a delete candidate (no remote call)
    FinishDelete(DeleteCandidate),
    /// pending -> captured for a queue item (no remote call)
    IntakeItem(QueueItem),
    /// captured -> recreated: delete current name, rank, create
    Rebuild(QueueItem),
    /// recreated -> verified: re-look-up and fetch the item list
    Verify(QueueItem),
    /// verified -> done (no remote call)
    FinishItem(QueueItem),
}

impl Action {
    fn item_key(&self) -> String {
        match self {
            Self::IntakeDelete(c) | Self::DeleteRemote(c) | Self::FinishDelete(c) => c.key(),
            Self::IntakeItem(i) | Self::Rebuild(i) | Self::Verify(i) | Self::FinishItem(i) => {
                i.key()
            }
        }
    }
}

/// Derive the next step from the just-persisted state
///
/// The delete queue drains completely before any rebuild starts, and within
/// each queue the stored order is authoritative. Returns `None` when every
/// item is done.
pub(crate) fn next_action(state: &ResyncState) -> Option<Action> {
    for candidate in &state.delete_queue {
        let phase = state
            .delete_progress
            .get(&candidate.key())
            .map(|p| p.phase)
            .unwrap_or(Phase::Pending);
        match phase {
            Phase::Pending => return Some(Action::IntakeDelete(candidate.clone())),
            Phase::Captured => return Some(Action::DeleteRemote(candidate.clone())),
            Phase::Deleted | Phase::Recreated | Phase::Verified => {
                return Some(Action::FinishDelete(candidate.clone()))
            }
            Phase::Done => continue,
        }
    }

    for item in &state.queue {
        let phase = state
            .item_progress
            .get(&item.key())
            .map(|p| p.phase)
            .unwrap_or(Phase::Pending);
        match phase {
            Phase::Pending => return Some(Action::IntakeItem(item.clone())),
            Phase::Captured | Phase::Deleted => return Some(Action::Rebuild(item.clone())),
            Phase::Recreated => return Some(Action::Verify(item.clone())),
            Phase::Verified => return Some(Action::FinishItem(item.clone())),
            Phase::Done => continue,
        }
    }

    None
}

/// Drive the persisted state to completion, one step per iteration
pub(crate) async fn run_to_completion(env: &ResyncEnv, ctx: &JobContext) -> WorkerResult<()> {
    let mut last_key: Option<String> = None;

    loop {
        let mut state = load_state(env).await?;

        let Some(action) = next_action(&state) else {
            stamp_stage_completion(&mut state);
            persist(env, &mut state).await?;
            return Ok(());
        };

        // Pace between items, not between the steps of one item
        let key = action.item_key();
        if last_key.as_ref().is_some_and(|k| *k != key) && env.settings.pacing_ms > 0 {
            tokio::time::sleep(StdDuration::from_millis(env.settings.pacing_ms)).await;
        }
        last_key = Some(key);

        perform(env, &mut state, &action).await?;

        stamp_stage_completion(&mut state);
        persist(env, &mut state).await?;
        patch_progress_summary(ctx, &state);
    }
}

/// Execute one action against the remote catalog, mutating `state`
///
/// On retry exhaustion the item is marked failed, a failure record is
/// appended and persisted, and the whole run aborts: the catalog offers no
/// transactions, so a stuck item needs operator attention or a clean retry
/// on the next full run, never a skip.
async fn perform(env: &ResyncEnv, state: &mut ResyncState, action: &Action) -> WorkerResult<()> {
    match action {
        Action::IntakeDelete(candidate) => {
            state.delete_progress_mut(&candidate.key()).advance(Phase::Captured);
            Ok(())
        }

        Action::DeleteRemote(candidate) => {
            let key = candidate.key();
            state.delete_progress_mut(&key).begin_attempt();

            let operation = format!("delete collection {}", candidate.collection_id);
            let result = retry::run(&operation, env.retry, || {
                env.catalog.delete_collection(candidate.collection_id)
            })
            .await;

            match result {
                Ok(DeleteOutcome::Deleted) => {
                    info!(key = %key, title = %candidate.title, "Deleted remote collection");
                    state.record_deletion(candidate);
                    state.delete_progress_mut(&key).advance(Phase::Deleted);
                    Ok(())
                }
                Ok(DeleteOutcome::NotFound) => {
                    // A prior crash may have already deleted it
                    debug!(key = %key, title = %candidate.title, "Collection already absent");
                    state.record_deletion(candidate);
                    state.delete_progress_mut(&key).advance(Phase::Deleted);
                    Ok(())
                }
                Err(e) => fail_step(env, state, StateSide::Delete, &key, &operation, e).await,
            }
        }

        Action::FinishDelete(candidate) => {
            state.delete_progress_mut(&candidate.key()).advance(Phase::Done);
            Ok(())
        }

        Action::IntakeItem(item) => {
            state.item_progress_mut(&item.key()).advance(Phase::Captured);
            Ok(())
        }

        Action::Rebuild(item) => rebuild_item(env, state, item).await,

        Action::Verify(item) => verify_item(env, state, item).await,

        Action::FinishItem(item) => {
            state.item_progress_mut(&item.key()).advance(Phase::Done);
            Ok(())
        }
    }
}

/// captured -> recreated: delete whatever currently carries the target name,
/// compute the desired list, and create the collection in that exact order
///
/// The three sub-steps are one persisted transition. Replaying it after a
/// crash is safe: the name delete tolerates absence, and creation always
/// follows deletion.
async fn rebuild_item(env: &ResyncEnv, state: &mut ResyncState, item: &QueueItem) -> WorkerResult<()> {
    let key = item.key();
    state.item_progress_mut(&key).begin_attempt();

    // Existing collection under the target name from before the migration
    // (or from a crashed earlier attempt). Absence is the normal case.
    let lookup = format!("find collection '{}'", item.display_name);
    let existing = retry::run_or_none(&lookup, env.retry, || {
        env.catalog.find_collection_by_name(item.section_id, &item.display_name)
    })
    .await
    .flatten();

    if let Some(found) = existing {
        let operation = format!("delete collection {}", found.id);
        let result = retry::run(&operation, env.retry, || {
            env.catalog.delete_collection(found.id)
        })
        .await;
        if let Err(e) = result {
            return fail_step(env, state, StateSide::Item, &key, &operation, e).await;
        }
        debug!(key = %key, collection_id = found.id, "Removed current incarnation before rebuild");
    }

    // Desired item list from the local recommendation data
    let desired = match env
        .recommendations
        .ranked_items(item.owner_id, item.section_id, item.source)
        .await
    {
        Ok(desired) => desired,
        Err(e) => {
            let operation = format!("rank items for '{}'", item.display_name);
            return fail_local(env, state, &key, &operation, e).await;
        }
    };

    if desired.is_empty() {
        // An empty collection is a valid terminal outcome, not a failure
        info!(key = %key, "Desired list is empty, skipping creation");
        let progress = state.item_progress_mut(&key);
        progress.skipped_empty = true;
        progress.advance(Phase::Recreated);
        return Ok(());
    }

    let operation = format!("create collection '{}'", item.display_name);
    let result = retry::run(&operation, env.retry, || {
        env.catalog.create_collection(
            item.section_id,
            item.media_kind,
            &item.display_name,
            &desired,
            &item.placement,
        )
    })
    .await;

    match result {
        Ok(()) => {
            info!(key = %key, items = desired.len(), "Recreated collection");
            let progress = state.item_progress_mut(&key);
            progress.skipped_empty = false;
            progress.advance(Phase::Recreated);
            Ok(())
        }
        Err(e) => fail_step(env, state, StateSide::Item, &key, &operation, e).await,
    }
}

/// recreated -> verified: confirm the rebuilt collection is actually there
async fn verify_item(env: &ResyncEnv, state: &mut ResyncState, item: &QueueItem) -> WorkerResult<()> {
    let key = item.key();
    let skipped_empty = state
        .item_progress
        .get(&key)
        .map(|p| p.skipped_empty)
        .unwrap_or(false);
    state.item_progress_mut(&key).begin_attempt();

    if skipped_empty {
        // Nothing was created, so there is nothing to look up
        state.item_progress_mut(&key).advance(Phase::Verified);
        return Ok(());
    }

    let lookup = format!("verify collection '{}'", item.display_name);
    let found = match retry::run(&lookup, env.retry, || {
        env.catalog.find_collection_by_name(item.section_id, &item.display_name)
    })
    .await
    {
        Ok(found) => found,
        Err(e) => return fail_step(env, state, StateSide::Item, &key, &lookup, e).await,
    };

    let Some(collection) = found else {
        // The desired list was non-empty but the collection is gone:
        // inconsistent remote state, not something to paper over
        let e = WorkerError::RecreatedCollectionMissing {
            name: item.display_name.clone(),
        };
        return fail_local(env, state, &key, &lookup, e).await;
    };

    let operation = format!("fetch items of collection {}", collection.id);
    match retry::run(&operation, env.retry, || {
        env.catalog.collection_items(collection.id)
    })
    .await
    {
        Ok(items) => {
            debug!(key = %key, items = items.len(), "Verified rebuilt collection");
            state.item_progress_mut(&key).advance(Phase::Verified);
            Ok(())
        }
        Err(e) => fail_step(env, state, StateSide::Item, &key, &operation, e).await,
    }
}

/// Which progress map a failing key belongs to
#[derive(Clone, Copy)]
enum StateSide {
    Delete,
    Item,
}

/// Record a remote-step failure, persist, and abort the run
async fn fail_step(
    env: &ResyncEnv,
    state: &mut ResyncState,
    side: StateSide,
    key: &str,
    operation: &str,
    error: WorkerError,
) -> WorkerResult<()> {
    let message = error.to_string();
    let progress = match side {
        StateSide::Delete => state.delete_progress_mut(key),
        StateSide::Item => state.item_progress_mut(key),
    };
    progress.mark_failed(message.as_str());
    state.record_failure(
        FailureSource::Remote,
        operation,
        key,
        message.as_str(),
        RESTART_GUIDANCE,
    );
    persist(env, state).await?;
    Err(error)
}

/// Record a local-logic failure, persist, and abort the run
async fn fail_local(
    env: &ResyncEnv,
    state: &mut ResyncState,
    key: &str,
    operation: &str,
    error: WorkerError,
) -> WorkerResult<()> {
    let message = error.to_string();
    state.item_progress_mut(key).mark_failed(message.as_str());
    state.record_failure(
        FailureSource::Local,
        operation,
        key,
        message.as_str(),
        RESTART_GUIDANCE,
    );
    persist(env, state).await?;
    Err(error)
}

/// Stamp the delete/recreate stage timestamps once their queues drain
fn stamp_stage_completion(state: &mut ResyncState) {
    let deletes_done = state
        .delete_queue
        .iter()
        .all(|c| progress_done(state.delete_progress.get(&c.key())));
    if deletes_done && state.phases.deleted_at.is_none() && !state.delete_queue.is_empty() {
        state.phases.deleted_at = Some(Utc::now());
    }

    let items_done = state
        .queue
        .iter()
        .all(|i| progress_done(state.item_progress.get(&i.key())));
    if items_done && state.phases.recreated_at.is_none() && !state.queue.is_empty() {
        state.phases.recreated_at = Some(Utc::now());
    }
}

fn progress_done(progress: Option<&ItemProgress>) -> bool {
    progress.map(ItemProgress::is_done).unwrap_or(false)
}

/// Load the working state from the checkpoint store
pub(crate) async fn load_state(env: &ResyncEnv) -> WorkerResult<ResyncState> {
    let raw = env
        .checkpoint
        .get(keys::RESYNC_STATE)
        .await?
        .ok_or_else(|| {
            WorkerError::StateCorrupted("working state missing from checkpoint store".to_string())
        })?;
    ResyncState::from_json(&raw)
}

/// Persist the working state and refresh the executor lock
///
/// Refreshing here, after every state-mutating step rather than on a timer,
/// is what keeps a live holder from being pre-empted while a dead one
/// expires on its own.
pub(crate) async fn persist(env: &ResyncEnv, state: &mut ResyncState) -> WorkerResult<()> {
    state.updated_at = Utc::now();
    env.checkpoint
        .put(keys::RESYNC_STATE, &state.to_json()?)
        .await?;
    env.checkpoint
        .refresh_lock(keys::RESYNC_LOCK, Duration::seconds(env.settings.lock_ttl_secs))
        .await?;
    Ok(())
}

fn patch_progress_summary(ctx: &JobContext, state: &ResyncState) {
    let deletes_done = state
        .delete_queue
        .iter()
        .filter(|c| progress_done(state.delete_progress.get(&c.key())))
        .count();
    let items_done = state
        .queue
        .iter()
        .filter(|i| progress_done(state.item_progress.get(&i.key())))
        .count();

    ctx.patch_summary(json!({
        "deletesDone": deletes_done,
        "deletesTotal": state.delete_queue.len(),
        "itemsDone": items_done,
        "itemsTotal": state.queue.len(),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MediaKind, PlacementHints};
    use crate::recommend::{CollectionFamily, SourceTable};

    fn candidate(collection_id: i64) -> DeleteCandidate {
        DeleteCandidate {
            section_id: 1,
            collection_id,
            title: format!("stale {}", collection_id),
            section_title: "Movies".to_string(),
        }
    }

    fn item(owner_id: i64) -> QueueItem {
        QueueItem {
            owner_id,
            media_kind: MediaKind::Movie,
            section_id: 1,
            base_name: CollectionFamily::Taste.base_name().to_string(),
            display_name: format!("Inspired by your Immaculate Taste (user{})", owner_id),
            source: SourceTable::MovieTaste,
            total_rows: 5,
            active_rows: 5,
            placement: PlacementHints::default(),
        }
    }

    #[test]
    fn test_next_action_drains_deletes_first() {
        let mut state = ResyncState::new(1);
        state.delete_queue.push(candidate(100));
        state.queue.push(item(1));

        assert_eq!(
            next_action(&state),
            Some(Action::IntakeDelete(candidate(100)))
        );

        state.delete_progress_mut("1:100").advance(Phase::Captured);
        assert_eq!(
            next_action(&state),
            Some(Action::DeleteRemote(candidate(100)))
        );

        state.delete_progress_mut("1:100").advance(Phase::Deleted);
        assert_eq!(
            next_action(&state),
            Some(Action::FinishDelete(candidate(100)))
        );

        state.delete_progress_mut("1:100").advance(Phase::Done);
        assert_eq!(next_action(&state), Some(Action::IntakeItem(item(1))));
    }

    #[test]
    fn test_next_action_item_phases() {
        let mut state = ResyncState::new(1);
        let key = item(1).key();
        state.queue.push(item(1));

        state.item_progress_mut(&key).advance(Phase::Captured);
        assert_eq!(next_action(&state), Some(Action::Rebuild(item(1))));

        state.item_progress_mut(&key).advance(Phase::Recreated);
        assert_eq!(next_action(&state), Some(Action::Verify(item(1))));

        state.item_progress_mut(&key).advance(Phase::Verified);
        assert_eq!(next_action(&state), Some(Action::FinishItem(item(1))));

        state.item_progress_mut(&key).advance(Phase::Done);
        assert_eq!(next_action(&state), None);
    }

    #[test]
    fn test_failed_item_reenters_same_step() {
        let mut state = ResyncState::new(1);
        let key = item(1).key();
        state.queue.push(item(1));

        let progress = state.item_progress_mut(&key);
        progress.advance(Phase::Captured);
        progress.begin_attempt();
        progress.mark_failed("create timed out");

        // The failed flag does not change which step runs next
        assert_eq!(next_action(&state), Some(Action::Rebuild(item(1))));
    }

    #[test]
    fn test_stage_stamps_set_once_queues_drain() {
        let mut state = ResyncState::new(1);
        state.delete_queue.push(candidate(100));
        state.queue.push(item(1));

        stamp_stage_completion(&mut state);
        assert!(state.phases.deleted_at.is_none());
        assert!(state.phases.recreated_at.is_none());

        state.delete_progress_mut("1:100").advance(Phase::Done);
        stamp_stage_completion(&mut state);
        assert!(state.phases.deleted_at.is_some());
        assert!(state.phases.recreated_at.is_none());

        let key = item(1).key();
        state.item_progress_mut(&key).advance(Phase::Done);
        stamp_stage_completion(&mut state);
        assert!(state.phases.recreated_at.is_some());

        // Stamps are written once, not refreshed
        let stamped = state.phases.deleted_at;
        stamp_stage_completion(&mut state);
        assert_eq!(state.phases.deleted_at, stamped);
    }
}
