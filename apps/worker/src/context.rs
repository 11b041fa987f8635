//! Per-invocation job execution context

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// What caused a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Scheduled,
    Event,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// Execution handle owned by exactly one job run
///
/// Carries the run's identity and a live summary that handlers patch as they
/// make progress; the summary is consumed by the UI layer outside this crate.
/// A context is created per invocation and dropped when the run returns -
/// it is never shared across concurrent runs.
#[derive(Debug)]
pub struct JobContext {
    /// Stable job identifier (e.g., "collection_resync")
    pub job_id: String,

    /// Unique id for this invocation
    pub run_id: Uuid,

    /// Acting user
    pub user_id: i64,

    /// When true, handlers must not mutate external state
    pub dry_run: bool,

    /// What caused this run
    pub trigger: Trigger,

    /// When the context was created
    pub started_at: DateTime<Utc>,

    summary: Mutex<Map<String, Value>>,
}

impl JobContext {
    /// Create a context for a new job run
    pub fn new(job_id: impl Into<String>, user_id: i64, dry_run: bool, trigger: Trigger) -> Self {
        Self {
            job_id: job_id.into(),
            run_id: Uuid::new_v4(),
            user_id,
            dry_run,
            trigger,
            started_at: Utc::now(),
            summary: Mutex::new(Map::new()),
        }
    }

    /// Merge the top-level keys of `patch` into the live summary
    ///
    /// Non-object patches are stored under a "value" key so callers can pass
    /// bare values without crashing the sink.
    pub fn patch_summary(&self, patch: Value) {
        let mut summary = self.summary.lock().unwrap();
        match patch {
            Value::Object(map) => {
                for (key, value) in map {
                    summary.insert(key, value);
                }
            }
            other => {
                summary.insert("value".to_string(), other);
            }
        }
    }

    /// Snapshot of the current summary
    pub fn summary(&self) -> Value {
        Value::Object(self.summary.lock().unwrap().clone())
    }
}
