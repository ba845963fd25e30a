pub mod memory;

use crate::domain::connector::{ConnectorError, ConnectorResult};
use crate::domain::models::{
    ComposedDocument, CrawlJob, CrawlStatus, FetchActivity, IngestedDocument,
};
use crate::domain::sink::{FrontierSink, IngestionSink};
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Storage trait for persistence operations.
#[async_trait]
pub trait Storage: Send + Sync {
    // Crawl jobs
    async fn save_job(&self, job: CrawlJob) -> AppResult<CrawlJob>;
    async fn get_job(&self, id: Uuid) -> AppResult<Option<CrawlJob>>;
    async fn update_job_status(&self, id: Uuid, status: CrawlStatus, error: Option<String>) -> AppResult<()>;

    // Frontier
    /// Add a seed; returns false if it was already queued.
    async fn add_seed(&self, id: &str) -> AppResult<bool>;
    async fn frontier(&self) -> AppResult<Vec<String>>;
    async fn remove_seed(&self, id: &str) -> AppResult<()>;

    // Seeding checkpoints, keyed by specification
    async fn seeded_until(&self, spec_key: &str) -> AppResult<Option<i64>>;
    async fn set_seeded_until(&self, spec_key: &str, until: i64) -> AppResult<()>;

    // Versions of ingested documents
    async fn stored_version(&self, id: &str) -> AppResult<Option<String>>;
    async fn set_stored_version(&self, id: &str, version: &str) -> AppResult<()>;
    async fn remove_stored_version(&self, id: &str) -> AppResult<()>;

    // Ingested documents
    async fn save_document(&self, document: IngestedDocument) -> AppResult<()>;
    async fn delete_document(&self, id: &str) -> AppResult<bool>;
    async fn list_documents(&self) -> AppResult<Vec<IngestedDocument>>;

    // Activity log
    async fn record_activity(&self, activity: FetchActivity) -> AppResult<()>;
    async fn list_activities(&self, limit: usize) -> AppResult<Vec<FetchActivity>>;
}

/// Adapts a [`Storage`] into the connector's ingestion and frontier sinks.
pub struct StorageSink {
    storage: Arc<dyn Storage>,
}

impl StorageSink {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

fn sink_error(err: crate::error::AppError) -> ConnectorError {
    ConnectorError::Sink(err.to_string())
}

#[async_trait]
impl IngestionSink for StorageSink {
    async fn ingest(
        &self,
        id: &str,
        version: &str,
        url: &str,
        document: ComposedDocument,
    ) -> ConnectorResult<()> {
        self.storage
            .save_document(IngestedDocument {
                id: id.to_string(),
                version: version.to_string(),
                url: url.to_string(),
                document,
                ingested_at: Utc::now(),
            })
            .await
            .map_err(sink_error)
    }

    async fn delete(&self, id: &str) -> ConnectorResult<()> {
        self.storage.delete_document(id).await.map(|_| ()).map_err(sink_error)
    }

    async fn record_activity(&self, activity: FetchActivity) -> ConnectorResult<()> {
        self.storage.record_activity(activity).await.map_err(sink_error)
    }
}

#[async_trait]
impl FrontierSink for StorageSink {
    async fn add_seed(&self, id: &str) -> ConnectorResult<()> {
        self.storage.add_seed(id).await.map(|_| ()).map_err(sink_error)
    }
}
