//! Test doubles for the pipeline controller
//!
//! Mocks are scripted per item: the lookup client keys its script off the
//! title hint, which the work-item builder sets to the item id.

use async_trait::async_trait;
use libris_enrich::clients::{LookupClient, LookupError};
use libris_enrich::db::books::{CatalogRepository, RepoError};
use libris_enrich::db::progress::{ProgressStore, StoreError};
use libris_enrich::models::{EnrichmentRun, RunOptions};
use libris_enrich::pipeline::PipelineController;
use libris_enrich::types::{LookupResult, PipelineKind, SearchHints, WorkItem};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio_util::sync::CancellationToken;

/// Scripted response for one item id
pub enum Scripted {
    Hit(String),
    Miss,
    RateLimited,
    Fail,
    /// Never resolves; used to hold a run open
    Hang,
}

/// Lookup client returning scripted responses, with a call log
pub struct MockLookup {
    script: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    hang: Notify,
}

impl MockLookup {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            cancel_after: Mutex::new(None),
            hang: Notify::new(),
        }
    }

    pub fn respond(self, id: &str, response: Scripted) -> Self {
        self.script.lock().unwrap().insert(id.to_string(), response);
        self
    }

    /// Fire `token.cancel()` as the n-th lookup call resolves
    pub fn cancel_after(&self, n: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((n, token));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LookupClient for MockLookup {
    async fn lookup(&self, hints: &SearchHints) -> Result<LookupResult, LookupError> {
        let id = hints.title.clone().unwrap_or_default();
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(id.clone());
            calls.len()
        };

        if let Some((n, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if call_number == *n {
                token.cancel();
            }
        }

        enum Action {
            Hit(String),
            Miss,
            RateLimited,
            Fail,
            Hang,
        }

        // Decide under the lock, act after releasing it
        let action = {
            let script = self.script.lock().unwrap();
            match script.get(&id) {
                Some(Scripted::Hit(value)) => Action::Hit(value.clone()),
                Some(Scripted::Miss) | None => Action::Miss,
                Some(Scripted::RateLimited) => Action::RateLimited,
                Some(Scripted::Fail) => Action::Fail,
                Some(Scripted::Hang) => Action::Hang,
            }
        };

        match action {
            Action::Hit(value) => Ok(LookupResult::hit(value)),
            Action::Miss => Ok(LookupResult::miss()),
            Action::RateLimited => Err(LookupError::RateLimited),
            Action::Fail => Err(LookupError::Transient("injected".to_string())),
            Action::Hang => {
                self.hang.notified().await;
                Ok(LookupResult::miss())
            }
        }
    }
}

/// Catalog repository recording commits, with injectable write failures
pub struct MockCatalog {
    commits: Mutex<Vec<(String, String, String)>>,
    fail_ids: Mutex<HashSet<String>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            commits: Mutex::new(Vec::new()),
            fail_ids: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_on(self, id: &str) -> Self {
        self.fail_ids.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn commits(&self) -> Vec<(String, String, String)> {
        self.commits.lock().unwrap().clone()
    }

    pub fn committed_ids(&self) -> Vec<String> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl CatalogRepository for MockCatalog {
    async fn list_candidates(
        &self,
        _kind: PipelineKind,
        _limit: usize,
    ) -> Result<Vec<WorkItem>, RepoError> {
        Ok(Vec::new())
    }

    async fn update_field(&self, id: &str, field: &str, value: &str) -> Result<(), RepoError> {
        if self.fail_ids.lock().unwrap().contains(id) {
            return Err(RepoError::Database(sqlx::Error::Protocol(
                "injected write failure".to_string(),
            )));
        }
        self.commits
            .lock()
            .unwrap()
            .push((id.to_string(), field.to_string(), value.to_string()));
        Ok(())
    }
}

/// In-memory progress store with an operation log
pub struct MockProgress {
    entries: Mutex<HashMap<(&'static str, String), String>>,
    ops: Mutex<Vec<String>>,
}

impl MockProgress {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
        }
    }

    /// Seed a pending entry, as an interrupted earlier run would have left it
    pub fn seed(&self, kind: PipelineKind, item_id: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert((kind.as_str(), item_id.to_string()), value.to_string());
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn entry(&self, kind: PipelineKind, item_id: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(&(kind.as_str(), item_id.to_string()))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl ProgressStore for MockProgress {
    async fn put(
        &self,
        kind: PipelineKind,
        item_id: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("put:{}:{}", kind.as_str(), item_id));
        self.entries
            .lock()
            .unwrap()
            .insert((kind.as_str(), item_id.to_string()), value.to_string());
        Ok(())
    }

    async fn get(&self, kind: PipelineKind, item_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&(kind.as_str(), item_id.to_string()))
            .cloned())
    }

    async fn delete(&self, kind: PipelineKind, item_id: &str) -> Result<(), StoreError> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("delete:{}:{}", kind.as_str(), item_id));
        self.entries
            .lock()
            .unwrap()
            .remove(&(kind.as_str(), item_id.to_string()));
        Ok(())
    }

    async fn count(&self, kind: PipelineKind) -> Result<usize, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|(pipeline, _)| *pipeline == kind.as_str())
            .count())
    }

    async fn clear(&self, kind: PipelineKind) -> Result<(), StoreError> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("clear:{}", kind.as_str()));
        self.entries
            .lock()
            .unwrap()
            .retain(|(pipeline, _), _| *pipeline != kind.as_str());
        Ok(())
    }
}

/// Work item whose title hint doubles as the mock lookup script key
pub fn work_item(id: &str) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        hints: SearchHints {
            title: Some(id.to_string()),
            ..SearchHints::default()
        },
        current_value: None,
    }
}

pub fn work_items(ids: &[&str]) -> Vec<WorkItem> {
    ids.iter().map(|id| work_item(id)).collect()
}

/// Zero-delay pacing so tests never wait on wall-clock sleeps
pub fn instant_options(batch_size: usize) -> RunOptions {
    RunOptions {
        batch_size,
        inter_call_delay: Duration::ZERO,
        inter_batch_delay: Duration::ZERO,
        settle_delay: Duration::ZERO,
    }
}

pub fn run_handle(kind: PipelineKind, total_items: usize) -> Arc<RwLock<EnrichmentRun>> {
    Arc::new(RwLock::new(EnrichmentRun::new(kind, total_items)))
}

pub struct Harness {
    pub lookup: Arc<MockLookup>,
    pub catalog: Arc<MockCatalog>,
    pub progress: Arc<MockProgress>,
    pub events: broadcast::Sender<libris_enrich::types::RunEvent>,
    pub controller: Arc<PipelineController>,
}

impl Harness {
    pub fn new(lookup: MockLookup, catalog: MockCatalog) -> Self {
        let lookup = Arc::new(lookup);
        let catalog = Arc::new(catalog);
        let progress = Arc::new(MockProgress::new());
        let (events, _) = broadcast::channel(256);
        let controller = Arc::new(PipelineController::new(
            lookup.clone(),
            catalog.clone(),
            progress.clone(),
            events.clone(),
        ));
        Self {
            lookup,
            catalog,
            progress,
            events,
            controller,
        }
    }
}
