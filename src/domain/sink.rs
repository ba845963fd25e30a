use crate::domain::connector::ConnectorResult;
use crate::domain::models::{ComposedDocument, FetchActivity};
use async_trait::async_trait;

/// Receives ingestion decisions from the fetch pipeline.
#[async_trait]
pub trait IngestionSink: Send + Sync {
    /// Index a document under (identifier, version, url).
    async fn ingest(
        &self,
        id: &str,
        version: &str,
        url: &str,
        document: ComposedDocument,
    ) -> ConnectorResult<()>;

    /// Remove a document from the index.
    async fn delete(&self, id: &str) -> ConnectorResult<()>;

    async fn record_activity(&self, activity: FetchActivity) -> ConnectorResult<()>;
}

/// Receives seeds discovered for the crawl frontier. Deduplication is the
/// sink's concern.
#[async_trait]
pub trait FrontierSink: Send + Sync {
    async fn add_seed(&self, id: &str) -> ConnectorResult<()>;
}
