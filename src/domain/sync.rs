use crate::domain::connector::{
    ConnectorError, ConnectorResult, ProcessOutcome, ProcessRequest, RepositoryConnector,
};
use crate::domain::models::{CrawlJob, CrawlStatus, DocumentSpecification, TimeWindow};
use crate::domain::sink::IngestionSink;
use crate::error::{AppError, AppResult};
use crate::storage::{Storage, StorageSink};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Crawl orchestrator: drives seeding, versioning and processing rounds
/// against the connector, keeping frontier and versions in storage.
pub struct CrawlOrchestrator {
    connector: Arc<RepositoryConnector>,
    storage: Arc<dyn Storage>,
    sink: Arc<dyn IngestionSink>,
}

fn storage_error(err: AppError) -> ConnectorError {
    ConnectorError::Sink(err.to_string())
}

impl CrawlOrchestrator {
    pub fn new(
        connector: Arc<RepositoryConnector>,
        storage: Arc<dyn Storage>,
        sink: Arc<dyn IngestionSink>,
    ) -> Self {
        Self {
            connector,
            storage,
            sink,
        }
    }

    /// Start a crawl job (runs in background).
    pub async fn start_crawl(
        &self,
        spec: DocumentSpecification,
        requested_by: Option<Uuid>,
    ) -> AppResult<CrawlJob> {
        let job = CrawlJob::new(spec.key(), requested_by);
        self.storage.save_job(job.clone()).await?;

        let connector = Arc::clone(&self.connector);
        let storage = Arc::clone(&self.storage);
        let sink = Arc::clone(&self.sink);
        let pending = job.clone();

        tokio::spawn(async move {
            let job_id = pending.id;
            let result = Self::execute_crawl(connector, storage.clone(), sink, spec, pending).await;
            if let Err(e) = result {
                error!("Crawl job {} could not be recorded: {}", job_id, e);
                let _ = storage
                    .update_job_status(job_id, CrawlStatus::Failed, Some(e.to_string()))
                    .await;
            }
        });

        Ok(job)
    }

    /// Run one crawl to completion and store the final job state.
    pub async fn execute_crawl(
        connector: Arc<RepositoryConnector>,
        storage: Arc<dyn Storage>,
        sink: Arc<dyn IngestionSink>,
        spec: DocumentSpecification,
        mut job: CrawlJob,
    ) -> AppResult<CrawlJob> {
        info!("Starting crawl job {}", job.id);
        job.status = CrawlStatus::Running;
        storage.save_job(job.clone()).await?;

        match Self::crawl(&connector, &storage, sink.as_ref(), &spec, &mut job).await {
            Ok(()) => {
                job.status = CrawlStatus::Completed;
                info!(
                    "Crawl job {} completed: {} ingested, {} deleted, {} unchanged, {} failed",
                    job.id, job.ingested, job.deleted, job.unchanged, job.failed
                );
            }
            Err(e) => {
                job.status = match &e {
                    ConnectorError::Transient { retry_after, .. } => {
                        job.retry_after_secs = Some(retry_after.as_secs());
                        CrawlStatus::Deferred
                    }
                    ConnectorError::Cancelled => CrawlStatus::Cancelled,
                    _ => CrawlStatus::Failed,
                };
                warn!("Crawl job {} stopped ({:?}): {}", job.id, job.status, e);
                job.error = Some(e.to_string());
            }
        }

        job.completed_at = Some(Utc::now());
        storage.save_job(job.clone()).await
    }

    async fn crawl(
        connector: &RepositoryConnector,
        storage: &Arc<dyn Storage>,
        sink: &dyn IngestionSink,
        spec: &DocumentSpecification,
        job: &mut CrawlJob,
    ) -> ConnectorResult<()> {
        let spec_key = spec.key();
        let now = connector.clock().now_millis();
        let start = storage
            .seeded_until(&spec_key)
            .await
            .map_err(storage_error)?
            .unwrap_or(0);
        job.window = TimeWindow::new(Some(start), Some(now));

        let frontier = StorageSink::new(Arc::clone(storage));
        job.seeds = connector
            .add_seed_documents(spec, job.window, &frontier)
            .await?;

        let ids = storage.frontier().await.map_err(storage_error)?;
        let versions = connector.document_versions(&ids, spec).await?;

        let mut requests = Vec::new();
        for id in &ids {
            let stored = storage.stored_version(id).await.map_err(storage_error)?;
            match versions.get(id).cloned().flatten() {
                Some(token) => {
                    let version = token.encode();
                    if stored.as_deref() == Some(version.as_str()) {
                        job.unchanged += 1;
                        storage.remove_seed(id).await.map_err(storage_error)?;
                    } else {
                        requests.push(ProcessRequest::new(id.as_str(), version, false));
                    }
                }
                None => {
                    sink.delete(id).await?;
                    storage.remove_stored_version(id).await.map_err(storage_error)?;
                    storage.remove_seed(id).await.map_err(storage_error)?;
                    job.deleted += 1;
                }
            }
        }

        let batch_size = RepositoryConnector::descriptor().max_document_request.max(1);
        for batch in requests.chunks(batch_size) {
            let outcomes = connector.process_documents(batch, sink).await?;
            for (request, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    ProcessOutcome::Ingested { .. } => {
                        storage
                            .set_stored_version(&request.id, &request.version)
                            .await
                            .map_err(storage_error)?;
                        storage.remove_seed(&request.id).await.map_err(storage_error)?;
                        job.ingested += 1;
                    }
                    ProcessOutcome::Deleted => {
                        storage
                            .remove_stored_version(&request.id)
                            .await
                            .map_err(storage_error)?;
                        storage.remove_seed(&request.id).await.map_err(storage_error)?;
                        job.deleted += 1;
                    }
                    // Stays on the frontier for the next crawl.
                    ProcessOutcome::Failed { .. } => job.failed += 1,
                    ProcessOutcome::Skipped => {}
                }
            }
        }
        connector.release_document_versions(&ids);

        storage
            .set_seeded_until(&spec_key, now)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
