//! Durable working state for the collection resynchronization migration
//!
//! A single versioned JSON document, persisted to the checkpoint store after
//! every phase transition and re-read at every decision point. All maps are
//! `BTreeMap` so the serialized form is deterministic. The failure and
//! deleted-collection lists are append-only audit logs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{MediaKind, PlacementHints};
use crate::error::{WorkerError, WorkerResult};
use crate::recommend::{CollectionFamily, SourceTable};

/// Schema version of the persisted document
pub const STATE_VERSION: u32 = 1;

/// Forward-only progress phases for queue items and delete candidates
///
/// Variant order is the progression order. Failure is a retryable side state
/// on [`ItemProgress`], not a phase, so a failed item keeps its last
/// successful phase and re-enters the same step on the next run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Captured,
    Deleted,
    Recreated,
    Verified,
    Done,
}

impl Phase {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Captured => "captured",
            Self::Deleted => "deleted",
            Self::Recreated => "recreated",
            Self::Verified => "verified",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One target collection that must exist after the migration
///
/// Identity is `(owner_id, media_kind, section_id, base_name)` and is stable
/// across runs; the display name may be re-resolved on resume without
/// changing the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub owner_id: i64,
    pub media_kind: MediaKind,
    pub section_id: i64,
    pub base_name: String,

    /// Desired remote collection name (base + current owner display name)
    pub display_name: String,

    /// Which local source table this item came from
    pub source: SourceTable,

    /// All rows found for this group
    pub total_rows: i64,

    /// Rows that should actually render in the rebuilt collection
    pub active_rows: i64,

    /// Home-screen placement for the rebuilt collection
    pub placement: PlacementHints,
}

impl QueueItem {
    /// Stable progress-map key
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.owner_id, self.media_kind, self.section_id, self.base_name
        )
    }

    /// The collection family this item belongs to
    pub fn family(&self) -> CollectionFamily {
        self.source.family()
    }
}

/// A remote collection slated for removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCandidate {
    pub section_id: i64,
    pub collection_id: i64,
    pub title: String,
    pub section_title: String,
}

impl DeleteCandidate {
    /// Stable progress-map key
    pub fn key(&self) -> String {
        format!("{}:{}", self.section_id, self.collection_id)
    }
}

/// Mutable progress for one queue item or delete candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemProgress {
    /// Last successfully reached phase; only moves forward
    pub phase: Phase,

    /// Number of step attempts made on this item
    pub attempts: u32,

    /// Set when the item's current step exhausted its retries
    pub failed: bool,

    /// Error text from the most recent failure
    pub last_error: Option<String>,

    /// The item's desired list was empty, so creation was skipped
    pub skipped_empty: bool,

    /// Timestamp per phase reached, keyed by phase name
    pub reached: BTreeMap<String, DateTime<Utc>>,
}

impl ItemProgress {
    /// Fresh progress at `pending`
    pub fn new() -> Self {
        let mut reached = BTreeMap::new();
        reached.insert(Phase::Pending.as_str().to_string(), Utc::now());
        Self {
            phase: Phase::Pending,
            attempts: 0,
            failed: false,
            last_error: None,
            skipped_empty: false,
            reached,
        }
    }

    /// Move forward to `phase`, clearing any failure flag
    ///
    /// Backward transitions are ignored so a replayed step cannot regress
    /// persisted progress.
    pub fn advance(&mut self, phase: Phase) {
        if phase > self.phase {
            self.phase = phase;
            self.reached.insert(phase.as_str().to_string(), Utc::now());
        }
        self.failed = false;
        self.last_error = None;
    }

    /// Record a step attempt starting
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Mark the current step failed; the phase keeps its last successful
    /// value so the next run re-enters the same step
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.failed = true;
        self.last_error = Some(error.into());
    }

    /// Whether this item has finished all of its phases
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

impl Default for ItemProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a failure originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSource {
    Remote,
    Local,
}

/// Append-only failure record with operator-facing restart guidance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub source: FailureSource,
    pub operation: String,
    pub item_key: String,
    pub message: String,
    pub restart_guidance: String,
    pub timestamp: DateTime<Utc>,
}

/// Audit entry for a successfully deleted remote collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCollection {
    pub section_id: i64,
    pub collection_id: i64,
    pub title: String,
    pub deleted_at: DateTime<Utc>,
}

/// Ownership recognized from a remote collection's name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedOwnership {
    pub family: CollectionFamily,
    pub owner_title: String,

    /// The owner suffix matched a pre-migration display name rather than a
    /// current one
    pub pre_migration: bool,
}

/// One remote collection as seen in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCollectionRecord {
    pub collection_id: i64,
    pub title: String,

    /// Present when the naming recognizer classified this collection as
    /// application-owned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognized: Option<RecognizedOwnership>,
}

/// Point-in-time inventory of one section's collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionInventory {
    pub section_id: i64,
    pub section_title: String,
    pub media_kind: MediaKind,
    pub collections: Vec<RemoteCollectionRecord>,
}

/// The captured pre-deletion inventory, taken exactly once per migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySnapshot {
    pub taken_at: DateTime<Utc>,
    pub sections: Vec<SectionInventory>,
}

/// Completion timestamps of the migration's four stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStamps {
    pub captured_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub recreated_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// The migration's durable working state (one logical singleton per version)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncState {
    pub version: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub admin_user_id: i64,

    /// Display names captured before refreshing remote identity data, used
    /// to recognize pre-migration collection names
    pub pre_refresh_user_titles: BTreeMap<i64, String>,

    pub queue: Vec<QueueItem>,
    pub item_progress: BTreeMap<String, ItemProgress>,

    pub delete_queue: Vec<DeleteCandidate>,
    pub delete_progress: BTreeMap<String, ItemProgress>,

    /// Append-only audit log of deleted remote collections
    pub deleted_collections: Vec<DeletedCollection>,

    /// Captured pre-delete inventory; absent until capture runs
    pub snapshot: Option<LibrarySnapshot>,

    /// Append-only failure log
    pub failures: Vec<FailureRecord>,

    pub phases: PhaseStamps,
}

impl ResyncState {
    /// Create a fresh state document
    pub fn new(admin_user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            started_at: now,
            updated_at: now,
            admin_user_id,
            pre_refresh_user_titles: BTreeMap::new(),
            queue: Vec::new(),
            item_progress: BTreeMap::new(),
            delete_queue: Vec::new(),
            delete_progress: BTreeMap::new(),
            deleted_collections: Vec::new(),
            snapshot: None,
            failures: Vec::new(),
            phases: PhaseStamps::default(),
        }
    }

    /// Serialize for persistence
    pub fn to_json(&self) -> WorkerResult<String> {
        serde_json::to_string(self).map_err(WorkerError::JobDeserialization)
    }

    /// Parse a persisted document
    ///
    /// Unparsable JSON or an unknown schema version is an integrity error,
    /// never silently reset.
    pub fn from_json(raw: &str) -> WorkerResult<Self> {
        let state: Self = serde_json::from_str(raw)
            .map_err(|e| WorkerError::StateCorrupted(e.to_string()))?;
        if state.version != STATE_VERSION {
            return Err(WorkerError::StateCorrupted(format!(
                "unsupported state version {} (expected {})",
                state.version, STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Progress entry for a queue item, created at `pending` if absent
    pub fn item_progress_mut(&mut self, key: &str) -> &mut ItemProgress {
        self.item_progress
            .entry(key.to_string())
            .or_insert_with(ItemProgress::new)
    }

    /// Progress entry for a delete candidate, created at `pending` if absent
    pub fn delete_progress_mut(&mut self, key: &str) -> &mut ItemProgress {
        self.delete_progress
            .entry(key.to_string())
            .or_insert_with(ItemProgress::new)
    }

    /// Append to the deletion audit log, at most once per distinct key
    pub fn record_deletion(&mut self, candidate: &DeleteCandidate) {
        let already_logged = self
            .deleted_collections
            .iter()
            .any(|d| d.section_id == candidate.section_id && d.collection_id == candidate.collection_id);
        if !already_logged {
            self.deleted_collections.push(DeletedCollection {
                section_id: candidate.section_id,
                collection_id: candidate.collection_id,
                title: candidate.title.clone(),
                deleted_at: Utc::now(),
            });
        }
    }

    /// Append a failure record
    pub fn record_failure(
        &mut self,
        source: FailureSource,
        operation: impl Into<String>,
        item_key: impl Into<String>,
        message: impl Into<String>,
        restart_guidance: impl Into<String>,
    ) {
        self.failures.push(FailureRecord {
            source,
            operation: operation.into(),
            item_key: item_key.into(),
            message: message.into(),
            restart_guidance: restart_guidance.into(),
            timestamp: Utc::now(),
        });
    }

    /// Key of the first delete candidate or queue item not yet `done`
    pub fn first_incomplete(&self) -> Option<String> {
        for candidate in &self.delete_queue {
            let key = candidate.key();
            if !self
                .delete_progress
                .get(&key)
                .map(ItemProgress::is_done)
                .unwrap_or(false)
            {
                return Some(key);
            }
        }
        for item in &self.queue {
            let key = item.key();
            if !self
                .item_progress
                .get(&key)
                .map(ItemProgress::is_done)
                .unwrap_or(false)
            {
                return Some(key);
            }
        }
        None
    }
}
