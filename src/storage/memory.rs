use crate::domain::models::{CrawlJob, CrawlStatus, FetchActivity, IngestedDocument};
use crate::error::{AppError, AppResult};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::RwLock;
use uuid::Uuid;

/// Fetch activities retained by default; older ones are dropped first.
pub const MAX_ACTIVITIES: usize = 10_000;

/// In-memory storage implementation for development.
pub struct InMemoryStorage {
    jobs: RwLock<HashMap<Uuid, CrawlJob>>,
    frontier: RwLock<BTreeSet<String>>,
    checkpoints: RwLock<HashMap<String, i64>>,
    versions: RwLock<HashMap<String, String>>,
    documents: RwLock<BTreeMap<String, IngestedDocument>>,
    activities: RwLock<VecDeque<FetchActivity>>,
    activity_limit: usize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_activity_limit(MAX_ACTIVITIES)
    }

    pub fn with_activity_limit(activity_limit: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            frontier: RwLock::new(BTreeSet::new()),
            checkpoints: RwLock::new(HashMap::new()),
            versions: RwLock::new(HashMap::new()),
            documents: RwLock::new(BTreeMap::new()),
            activities: RwLock::new(VecDeque::new()),
            activity_limit: activity_limit.max(1),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> AppError {
    AppError::Internal("Lock poisoned".to_string())
}

#[async_trait]
impl Storage for InMemoryStorage {
    // Crawl jobs
    async fn save_job(&self, job: CrawlJob) -> AppResult<CrawlJob> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> AppResult<Option<CrawlJob>> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(&id).cloned())
    }

    async fn update_job_status(&self, id: Uuid, status: CrawlStatus, error: Option<String>) -> AppResult<()> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if let Some(job) = jobs.get_mut(&id) {
            job.status = status;
            job.error = error;
            if !matches!(status, CrawlStatus::Pending | CrawlStatus::Running) {
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    // Frontier
    async fn add_seed(&self, id: &str) -> AppResult<bool> {
        let mut frontier = self.frontier.write().map_err(poisoned)?;
        Ok(frontier.insert(id.to_string()))
    }

    async fn frontier(&self) -> AppResult<Vec<String>> {
        let frontier = self.frontier.read().map_err(poisoned)?;
        Ok(frontier.iter().cloned().collect())
    }

    async fn remove_seed(&self, id: &str) -> AppResult<()> {
        let mut frontier = self.frontier.write().map_err(poisoned)?;
        frontier.remove(id);
        Ok(())
    }

    // Seeding checkpoints
    async fn seeded_until(&self, spec_key: &str) -> AppResult<Option<i64>> {
        let checkpoints = self.checkpoints.read().map_err(poisoned)?;
        Ok(checkpoints.get(spec_key).copied())
    }

    async fn set_seeded_until(&self, spec_key: &str, until: i64) -> AppResult<()> {
        let mut checkpoints = self.checkpoints.write().map_err(poisoned)?;
        checkpoints.insert(spec_key.to_string(), until);
        Ok(())
    }

    // Versions
    async fn stored_version(&self, id: &str) -> AppResult<Option<String>> {
        let versions = self.versions.read().map_err(poisoned)?;
        Ok(versions.get(id).cloned())
    }

    async fn set_stored_version(&self, id: &str, version: &str) -> AppResult<()> {
        let mut versions = self.versions.write().map_err(poisoned)?;
        versions.insert(id.to_string(), version.to_string());
        Ok(())
    }

    async fn remove_stored_version(&self, id: &str) -> AppResult<()> {
        let mut versions = self.versions.write().map_err(poisoned)?;
        versions.remove(id);
        Ok(())
    }

    // Documents
    async fn save_document(&self, document: IngestedDocument) -> AppResult<()> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> AppResult<bool> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        Ok(documents.remove(id).is_some())
    }

    async fn list_documents(&self) -> AppResult<Vec<IngestedDocument>> {
        let documents = self.documents.read().map_err(poisoned)?;
        Ok(documents.values().cloned().collect())
    }

    // Activities
    async fn record_activity(&self, activity: FetchActivity) -> AppResult<()> {
        let mut activities = self.activities.write().map_err(poisoned)?;
        while activities.len() >= self.activity_limit {
            activities.pop_front();
        }
        activities.push_back(activity);
        Ok(())
    }

    async fn list_activities(&self, limit: usize) -> AppResult<Vec<FetchActivity>> {
        let activities = self.activities.read().map_err(poisoned)?;
        let skip = activities.len().saturating_sub(limit);
        Ok(activities.iter().skip(skip).cloned().collect())
    }
}
