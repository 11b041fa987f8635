//! In-memory fakes for the resync collaborator traits
//!
//! `FakeRemoteLibrary` plays the media server: it stores sections,
//! collections and users behind a mutex, counts every remote call, and can
//! inject transient or permanent failures at chosen points so crash/retry
//! behavior can be exercised deterministically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use collectarr_worker::catalog::{
    CollectionSummary, DeleteOutcome, LibraryCatalog, MediaKind, PlacementHints, RemoteUser,
    Section, UserDirectory,
};
use collectarr_worker::error::{WorkerError, WorkerResult};
use collectarr_worker::recommend::{GroupCount, RecommendationSource, SourceTable};

fn transient() -> WorkerError {
    WorkerError::PlexUnreachable("injected transient failure".to_string())
}

fn permanent() -> WorkerError {
    WorkerError::PlexApi {
        status_code: 400,
        message: "injected permanent failure".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct StoredCollection {
    pub id: i64,
    pub section_id: i64,
    pub title: String,
    pub items: Vec<i64>,
    pub hints: PlacementHints,
}

#[derive(Default)]
struct LibraryInner {
    sections: Vec<Section>,
    collections: Vec<StoredCollection>,
    users: Vec<RemoteUser>,
}

struct OpFailure {
    remaining: usize,
    retryable: bool,
}

#[derive(Default)]
struct FailurePlan {
    /// One-shot transient failure at the n-th remote call (1-based)
    at_call: Option<usize>,
    op_failures: BTreeMap<String, OpFailure>,
}

/// In-memory media server
pub struct FakeRemoteLibrary {
    inner: Mutex<LibraryInner>,
    next_id: AtomicI64,
    calls: AtomicUsize,
    creates: AtomicUsize,
    plan: Mutex<FailurePlan>,
}

impl FakeRemoteLibrary {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LibraryInner::default()),
            next_id: AtomicI64::new(1000),
            calls: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            plan: Mutex::new(FailurePlan::default()),
        }
    }

    pub fn with_section(self, id: i64, title: &str, kind: MediaKind) -> Self {
        self.inner.lock().unwrap().sections.push(Section {
            id,
            title: title.to_string(),
            kind,
        });
        self
    }

    pub fn with_user(self, id: i64, title: &str, is_admin: bool) -> Self {
        self.inner.lock().unwrap().users.push(RemoteUser {
            id,
            title: title.to_string(),
            is_admin,
        });
        self
    }

    /// Seed a pre-existing remote collection; returns its id
    pub fn seed_collection(&self, section_id: i64, title: &str, items: &[i64]) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().unwrap().collections.push(StoredCollection {
            id,
            section_id,
            title: title.to_string(),
            items: items.to_vec(),
            hints: PlacementHints::default(),
        });
        id
    }

    /// Remove a collection out-of-band (simulates a prior crash's deletion)
    pub fn remove_collection(&self, collection_id: i64) {
        self.inner
            .lock()
            .unwrap()
            .collections
            .retain(|c| c.id != collection_id);
    }

    /// Fail the n-th remote call (1-based) with a transient error, once
    pub fn fail_at_call(&self, n: usize) {
        self.plan.lock().unwrap().at_call = Some(n);
    }

    /// Fail the next `times` calls of one operation kind
    pub fn fail_op(&self, op: &str, times: usize, retryable: bool) {
        self.plan.lock().unwrap().op_failures.insert(
            op.to_string(),
            OpFailure {
                remaining: times,
                retryable,
            },
        );
    }

    /// Total remote calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of collections actually created
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Current collections per section, sorted by title (for end-state
    /// comparisons across interrupted and uninterrupted runs)
    pub fn collections_snapshot(&self) -> BTreeMap<i64, Vec<(String, Vec<i64>)>> {
        let inner = self.inner.lock().unwrap();
        let mut snapshot: BTreeMap<i64, Vec<(String, Vec<i64>)>> = BTreeMap::new();
        for collection in &inner.collections {
            snapshot
                .entry(collection.section_id)
                .or_default()
                .push((collection.title.clone(), collection.items.clone()));
        }
        for collections in snapshot.values_mut() {
            collections.sort();
        }
        snapshot
    }

    /// Stored collection by title, if present
    pub fn find_by_title(&self, title: &str) -> Option<StoredCollection> {
        self.inner
            .lock()
            .unwrap()
            .collections
            .iter()
            .find(|c| c.title == title)
            .cloned()
    }

    fn check(&self, op: &str) -> WorkerResult<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut plan = self.plan.lock().unwrap();

        if plan.at_call == Some(n) {
            return Err(transient());
        }
        if let Some(failure) = plan.op_failures.get_mut(op) {
            if failure.remaining > 0 {
                failure.remaining -= 1;
                return Err(if failure.retryable {
                    transient()
                } else {
                    permanent()
                });
            }
        }
        Ok(())
    }
}

impl Default for FakeRemoteLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LibraryCatalog for FakeRemoteLibrary {
    async fn list_sections(&self) -> WorkerResult<Vec<Section>> {
        self.check("list_sections")?;
        Ok(self.inner.lock().unwrap().sections.clone())
    }

    async fn list_collections(&self, section_id: i64) -> WorkerResult<Vec<CollectionSummary>> {
        self.check("list_collections")?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .collections
            .iter()
            .filter(|c| c.section_id == section_id)
            .map(|c| CollectionSummary {
                id: c.id,
                title: c.title.clone(),
            })
            .collect())
    }

    async fn delete_collection(&self, collection_id: i64) -> WorkerResult<DeleteOutcome> {
        self.check("delete")?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.collections.len();
        inner.collections.retain(|c| c.id != collection_id);
        Ok(if inner.collections.len() < before {
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
        self.check("find")?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .collections
            .iter()
            .find(|c| c.section_id == section_id && c.title == name)
            .map(|c| CollectionSummary {
                id: c.id,
                title: c.title.clone(),
            }))
    }

    async fn create_collection(
        &self,
        section_id: i64,
        _kind: MediaKind,
        name: &str,
        ordered_item_ids: &[i64],
        hints: &PlacementHints,
    ) -> WorkerResult<()> {
        self.check("create")?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().unwrap().collections.push(StoredCollection {
            id,
            section_id,
            title: name.to_string(),
            items: ordered_item_ids.to_vec(),
            hints: hints.clone(),
        });
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn collection_items(&self, collection_id: i64) -> WorkerResult<Vec<i64>> {
        self.check("items")?;
        self.inner
            .lock()
            .unwrap()
            .collections
            .iter()
            .find(|c| c.id == collection_id)
            .map(|c| c.items.clone())
            .ok_or_else(|| WorkerError::NotFound(format!("collection {}", collection_id)))
    }
}

#[async_trait]
impl UserDirectory for FakeRemoteLibrary {
    async fn list_users(&self) -> WorkerResult<Vec<RemoteUser>> {
        self.check("list_users")?;
        Ok(self.inner.lock().unwrap().users.clone())
    }
}

/// In-memory recommendation tables
#[derive(Default)]
pub struct FakeRecommendations {
    groups: Mutex<Vec<GroupCount>>,
    ranked: Mutex<BTreeMap<(i64, i64, SourceTable), Vec<i64>>>,
    user_titles: Mutex<BTreeMap<i64, String>>,
}

impl FakeRecommendations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group with its ranked items; counts are derived from the list
    pub fn with_group(
        self,
        source: SourceTable,
        owner_id: i64,
        section_id: i64,
        ranked: &[i64],
    ) -> Self {
        self.groups.lock().unwrap().push(GroupCount {
            source,
            owner_id,
            section_id,
            total_rows: ranked.len() as i64,
            active_rows: ranked.len() as i64,
        });
        self.ranked
            .lock()
            .unwrap()
            .insert((owner_id, section_id, source), ranked.to_vec());
        self
    }

    /// Add a group whose active row count is zero (rebuild will skip)
    pub fn with_empty_group(self, source: SourceTable, owner_id: i64, section_id: i64) -> Self {
        self.groups.lock().unwrap().push(GroupCount {
            source,
            owner_id,
            section_id,
            total_rows: 3,
            active_rows: 0,
        });
        self.ranked
            .lock()
            .unwrap()
            .insert((owner_id, section_id, source), Vec::new());
        self
    }

    /// Set the locally cached (possibly stale) display names
    pub fn with_known_title(self, user_id: i64, title: &str) -> Self {
        self.user_titles
            .lock()
            .unwrap()
            .insert(user_id, title.to_string());
        self
    }
}

#[async_trait]
impl RecommendationSource for FakeRecommendations {
    async fn group_counts(&self) -> WorkerResult<Vec<GroupCount>> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn ranked_items(
        &self,
        owner_id: i64,
        section_id: i64,
        source: SourceTable,
    ) -> WorkerResult<Vec<i64>> {
        Ok(self
            .ranked
            .lock()
            .unwrap()
            .get(&(owner_id, section_id, source))
            .cloned()
            .unwrap_or_default())
    }

    async fn known_user_titles(&self) -> WorkerResult<BTreeMap<i64, String>> {
        Ok(self.user_titles.lock().unwrap().clone())
    }
}
