//! One-time collection resynchronization migration
//!
//! Deletes and deterministically rebuilds every application-owned curated
//! collection on the remote media server from locally stored recommendation
//! data. The migration is crash-safe: progress is checkpointed after every
//! phase transition, a TTL lock keeps concurrent executors out, and a
//! permanent completion marker makes every later invocation a no-op.
//!
//! Control flow per run: completion/lock short-circuits, then build or
//! resume the working state, capture the pre-delete snapshot, drive the
//! state machine to completion, and finalize by writing the completion
//! markers.

pub mod machine;
pub mod queue;
pub mod snapshot;
pub mod state;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::catalog::{LibraryCatalog, UserDirectory};
use crate::checkpoint::{keys, CheckpointStore};
use crate::config::ResyncSettings;
use crate::context::{JobContext, Trigger};
use crate::error::{WorkerError, WorkerResult};
use crate::recommend::RecommendationSource;
use crate::report::{ReportBuilder, ReportSection, RunOutcome, RunReport};
use crate::retry::RetryPolicy;

use state::{FailureSource, ResyncState};

/// Stable job identifier
pub const JOB_ID: &str = "collection_resync";

/// Collaborators and knobs the migration runs against
#[derive(Clone)]
pub struct ResyncEnv {
    pub checkpoint: Arc<dyn CheckpointStore>,
    pub catalog: Arc<dyn LibraryCatalog>,
    pub recommendations: Arc<dyn RecommendationSource>,
    pub users: Arc<dyn UserDirectory>,
    pub settings: ResyncSettings,
    pub retry: RetryPolicy,
}

/// Collection resync job payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResyncJob {
    /// Acting user recorded in the run context
    pub user_id: i64,

    /// Plan only: no remote mutation, no checkpoint writes
    pub dry_run: bool,

    /// What caused this run
    pub trigger: Trigger,
}

impl Default for CollectionResyncJob {
    fn default() -> Self {
        Self {
            user_id: 1,
            dry_run: false,
            trigger: Trigger::Manual,
        }
    }
}

/// Execute the collection resync job
///
/// Always returns a report; a run that failed returns a report whose
/// headline says so, never a success headline with a smuggled error.
pub async fn execute(
    env: &ResyncEnv,
    ctx: &JobContext,
    _job: &CollectionResyncJob,
) -> WorkerResult<RunReport> {
    match execute_inner(env, ctx).await {
        Ok(report) => Ok(report),
        Err(e) => {
            e.log();
            Ok(ReportBuilder::new(RunOutcome::Failed, format!("failed: {}", e))
                .issue(e.to_string())
                .build())
        }
    }
}

async fn execute_inner(env: &ResyncEnv, ctx: &JobContext) -> WorkerResult<RunReport> {
    if ctx.dry_run {
        return plan_dry_run(env, ctx).await;
    }

    // Successful completion is reported exactly once per migration version;
    // afterwards every invocation short-circuits without touching anything.
    if let Some(completed_at) = env.checkpoint.get(keys::RESYNC_COMPLETED_AT).await? {
        info!(completed_at = %completed_at, "Collection resync already completed");
        return Ok(ReportBuilder::new(RunOutcome::AlreadyCompleted, "already completed")
            .fact("completedAt", completed_at)
            .build());
    }

    let ttl = chrono::Duration::seconds(env.settings.lock_ttl_secs);
    let acquisition = env.checkpoint.acquire_lock(keys::RESYNC_LOCK, ttl).await?;
    if !acquisition.acquired {
        info!(expires_at = %acquisition.expires_at, "Resync lock held by another executor");
        return Ok(ReportBuilder::new(RunOutcome::LockHeld, "lock held")
            .fact("lockExpiresAt", acquisition.expires_at.to_rfc3339())
            .build());
    }

    let outcome = drive(env, ctx).await;

    if let Err(e) = env.checkpoint.release_lock(keys::RESYNC_LOCK).await {
        warn!(error = %e, "Failed to release resync lock; it will expire on its own");
    }

    outcome
}

/// Everything that runs under the lock
async fn drive(env: &ResyncEnv, ctx: &JobContext) -> WorkerResult<RunReport> {
    let current_titles = match env.checkpoint.get(keys::RESYNC_STATE).await? {
        None => initialize_state(env, ctx).await?,
        Some(raw) => resume_state(env, &raw).await?,
    };

    // Snapshot capture is guarded by "already present" inside
    let mut state = machine::load_state(env).await?;
    snapshot::capture_snapshot(env.catalog.as_ref(), &mut state, &current_titles, env.retry)
        .await?;
    machine::persist(env, &mut state).await?;

    ctx.patch_summary(json!({
        "queued": state.queue.len(),
        "deleteQueue": state.delete_queue.len(),
    }));

    machine::run_to_completion(env, ctx).await?;

    finalize(env)
        .await
        .map(|state| completion_report(&state))
}

/// First run: capture pre-refresh titles, then resolve identities and build
/// the deterministic queue
async fn initialize_state(env: &ResyncEnv, ctx: &JobContext) -> WorkerResult<BTreeMap<i64, String>> {
    // Locally cached titles first - after the identity refresh below they
    // are the only way to recognize pre-migration collection names
    let pre_refresh_titles = env.recommendations.known_user_titles().await?;

    let (admin_user_id, current_titles) =
        queue::resolve_users(env.users.as_ref(), env.retry).await?;

    let mut state = ResyncState::new(admin_user_id);
    state.pre_refresh_user_titles = pre_refresh_titles;
    state.queue = queue::build_queue(
        env.recommendations.as_ref(),
        admin_user_id,
        &current_titles,
        &env.settings,
    )
    .await?;

    info!(
        run_id = %ctx.run_id,
        admin_user_id,
        targets = state.queue.len(),
        "Starting collection resync"
    );

    machine::persist(env, &mut state).await?;
    Ok(current_titles)
}

/// Later run: keep the existing plan and progress, re-resolve display names
/// only (identities may have changed since the state was written)
async fn resume_state(env: &ResyncEnv, raw: &str) -> WorkerResult<BTreeMap<i64, String>> {
    let mut state = ResyncState::from_json(raw)?;

    let (_, current_titles) = queue::resolve_users(env.users.as_ref(), env.retry).await?;
    queue::refresh_display_names(&mut state, &current_titles);

    info!(
        targets = state.queue.len(),
        delete_queue = state.delete_queue.len(),
        "Resuming collection resync from persisted state"
    );

    machine::persist(env, &mut state).await?;
    Ok(current_titles)
}

/// Confirm every item completed, then write the permanent markers
async fn finalize(env: &ResyncEnv) -> WorkerResult<ResyncState> {
    let mut state = machine::load_state(env).await?;

    if let Some(key) = state.first_incomplete() {
        let error = WorkerError::PendingItemsRemain(key.clone());
        state.record_failure(
            FailureSource::Local,
            "finalize",
            key.as_str(),
            error.to_string(),
            "resolve the stuck item, then re-run the job to resume it",
        );
        machine::persist(env, &mut state).await?;
        return Err(error);
    }

    let now = Utc::now();
    let stamp = now.to_rfc3339();

    let mut versions: BTreeMap<String, String> =
        match env.checkpoint.get(keys::RESYNC_COMPLETED_VERSIONS).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                WorkerError::StateCorrupted(format!("completed-versions marker: {}", e))
            })?,
            None => BTreeMap::new(),
        };
    versions.insert(env.settings.version.clone(), stamp.clone());
    env.checkpoint
        .put(
            keys::RESYNC_COMPLETED_VERSIONS,
            &serde_json::to_string(&versions)?,
        )
        .await?;
    env.checkpoint.put(keys::RESYNC_COMPLETED_AT, &stamp).await?;

    state.phases.finalized_at = Some(now);
    machine::persist(env, &mut state).await?;

    info!(version = %env.settings.version, "Collection resync complete");
    Ok(state)
}

/// Project the final state into the run report
fn completion_report(state: &ResyncState) -> RunReport {
    let skipped_empty = state
        .item_progress
        .values()
        .filter(|p| p.skipped_empty)
        .count();

    let mut deleted_section = ReportSection::new("Deleted collections");
    for deleted in &state.deleted_collections {
        deleted_section = deleted_section.row(
            deleted.title.as_str(),
            format!("section {}, collection {}", deleted.section_id, deleted.collection_id),
        );
    }

    let mut rebuilt_section = ReportSection::new("Rebuilt collections");
    for item in &state.queue {
        let detail = match state.item_progress.get(&item.key()) {
            Some(progress) if progress.skipped_empty => "skipped_empty".to_string(),
            _ => format!("rebuilt, {} active rows", item.active_rows),
        };
        rebuilt_section = rebuilt_section.row(item.display_name.as_str(), detail);
    }

    let mut builder = ReportBuilder::new(RunOutcome::Completed, "completed")
        .fact("deleted", state.deleted_collections.len() as i64)
        .fact("rebuilt", state.queue.len() as i64)
        .fact("skippedEmpty", skipped_empty as i64)
        .fact("failuresLogged", state.failures.len() as i64)
        .section(deleted_section)
        .section(rebuilt_section);

    for failure in &state.failures {
        builder = builder.issue(format!(
            "{} ({}): {}",
            failure.operation, failure.item_key, failure.message
        ));
    }

    builder.build()
}

/// Dry run: resolve the plan and inventory in memory, mutate nothing
async fn plan_dry_run(env: &ResyncEnv, ctx: &JobContext) -> WorkerResult<RunReport> {
    let pre_refresh_titles = env.recommendations.known_user_titles().await?;
    let (admin_user_id, current_titles) =
        queue::resolve_users(env.users.as_ref(), env.retry).await?;

    let mut state = ResyncState::new(admin_user_id);
    state.pre_refresh_user_titles = pre_refresh_titles;
    state.queue = queue::build_queue(
        env.recommendations.as_ref(),
        admin_user_id,
        &current_titles,
        &env.settings,
    )
    .await?;

    snapshot::capture_snapshot(env.catalog.as_ref(), &mut state, &current_titles, env.retry)
        .await?;

    ctx.patch_summary(json!({
        "plannedDeletes": state.delete_queue.len(),
        "plannedRebuilds": state.queue.len(),
    }));

    let mut deletes = ReportSection::new("Would delete");
    for candidate in &state.delete_queue {
        deletes = deletes.row(
            candidate.title.as_str(),
            format!("section {}", candidate.section_title),
        );
    }

    let mut rebuilds = ReportSection::new("Would rebuild");
    for item in &state.queue {
        rebuilds = rebuilds.row(
            item.display_name.as_str(),
            format!("{} active rows", item.active_rows),
        );
    }

    Ok(ReportBuilder::new(RunOutcome::DryRun, "dry run")
        .fact("plannedDeletes", state.delete_queue.len() as i64)
        .fact("plannedRebuilds", state.queue.len() as i64)
        .section(deletes)
        .section(rebuilds)
        .build())
}
