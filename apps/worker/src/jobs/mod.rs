//! Background job definitions and queue plumbing
//!
//! Jobs are serialized onto a Redis list and drained by the worker's poll
//! loop. Each dispatch builds a fresh run context, wires the job's
//! collaborators from the shared application state, and logs the rendered
//! report.

pub mod collection_resync;

use std::sync::Arc;

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checkpoint::PgCheckpointStore;
use crate::context::JobContext;
use crate::error::{WorkerError, WorkerResult};
use crate::recommend::PgRecommendationSource;
use crate::AppState;

use collection_resync::{CollectionResyncJob, ResyncEnv};

/// Redis list the worker polls for queued jobs
pub const JOB_QUEUE_KEY: &str = "collectarr:jobs";

/// A queued background job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Job {
    CollectionResync(CollectionResyncJob),
}

impl Job {
    /// Stable job identifier for logging and run contexts
    pub fn job_id(&self) -> &'static str {
        match self {
            Self::CollectionResync(_) => collection_resync::JOB_ID,
        }
    }
}

/// Push a job onto the queue
pub async fn enqueue_job(redis: &redis::Client, job: &Job) -> WorkerResult<()> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let payload = serde_json::to_string(job)?;
    conn.lpush::<_, _, ()>(JOB_QUEUE_KEY, payload).await?;
    Ok(())
}

/// Pop the oldest queued job, if any
pub async fn dequeue_job(redis: &redis::Client) -> WorkerResult<Option<Job>> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let payload: Option<String> = conn.rpop(JOB_QUEUE_KEY, None).await?;

    match payload {
        Some(raw) => {
            let job = serde_json::from_str(&raw)
                .map_err(|e| WorkerError::InvalidJobData(e.to_string()))?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Run one dequeued job to completion
pub async fn dispatch(state: &AppState, job: Job) -> WorkerResult<()> {
    match job {
        Job::CollectionResync(payload) => {
            let env = resync_env(state)?;
            let ctx = JobContext::new(
                collection_resync::JOB_ID,
                payload.user_id,
                payload.dry_run,
                payload.trigger,
            );

            let report = collection_resync::execute(&env, &ctx, &payload).await?;

            if report.is_failure() {
                warn!(
                    job = collection_resync::JOB_ID,
                    run_id = %ctx.run_id,
                    report = %report.render(),
                    "Job run failed"
                );
            } else {
                info!(
                    job = collection_resync::JOB_ID,
                    run_id = %ctx.run_id,
                    report = %report.render(),
                    "Job run finished"
                );
            }
            Ok(())
        }
    }
}

/// Wire the resync collaborators from the shared application state
fn resync_env(state: &AppState) -> WorkerResult<ResyncEnv> {
    let plex = Arc::new(
        state
            .plex
            .clone()
            .ok_or(WorkerError::PlexNotConfigured)?,
    );

    Ok(ResyncEnv {
        checkpoint: Arc::new(PgCheckpointStore::new(state.db.clone())),
        catalog: plex.clone(),
        recommendations: Arc::new(PgRecommendationSource::new(
            state.db.clone(),
            state.config.resync.max_collection_size,
        )),
        users: plex,
        settings: state.config.resync.clone(),
        retry: state.config.retry_policy(),
    })
}
