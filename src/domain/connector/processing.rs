use crate::domain::connector::session::Clock;
use crate::domain::connector::version::VersionToken;
use crate::domain::connector::{ConnectorError, ConnectorResult};
use crate::domain::models::{ActivityStatus, ComposedDocument, FetchActivity};
use crate::domain::repository::{ContentStream, DocumentRecord, RepositoryClient};
use crate::domain::sink::IngestionSink;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Activity name recorded for every content fetch.
pub const ACTIVITY_FETCH: &str = "fetch";

/// Deny token added to every document so that principals matching no allow
/// entry stay excluded.
pub const GLOBAL_DENY_TOKEN: &str = "DEAD_AUTHORITY";

const READ_CHUNK: usize = 8 * 1024;

/// One document handed to the pipeline by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub scan_only: bool,
}

impl ProcessRequest {
    pub fn new(id: impl Into<String>, version: impl Into<String>, scan_only: bool) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            scan_only,
        }
    }
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Scan-only request; nothing fetched.
    Skipped,
    /// Not found in the repository; a delete was issued.
    Deleted,
    Ingested { bytes: u64 },
    Failed { message: String },
}

/// Build the allow and deny lists for a document. The deny list always holds
/// the global deny token exactly once.
pub fn compose_acl(record: &DocumentRecord) -> (Vec<String>, Vec<String>) {
    let allow = record.allowed().to_vec();
    let mut deny = Vec::with_capacity(record.disallowed().len() + 1);
    deny.push(GLOBAL_DENY_TOKEN.to_string());
    deny.extend(
        record
            .disallowed()
            .iter()
            .filter(|token| token.as_str() != GLOBAL_DENY_TOKEN)
            .cloned(),
    );
    (allow, deny)
}

/// Per-document fetch and ingest.
pub struct FetchPipeline<'a> {
    client: &'a dyn RepositoryClient,
    sink: &'a dyn IngestionSink,
    clock: &'a dyn Clock,
}

impl<'a> FetchPipeline<'a> {
    pub fn new(
        client: &'a dyn RepositoryClient,
        sink: &'a dyn IngestionSink,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            client,
            sink,
            clock,
        }
    }

    /// Process a batch in order. Document failures are isolated into
    /// [`ProcessOutcome::Failed`]; cancellation aborts the batch.
    pub async fn process_batch(
        &self,
        requests: &[ProcessRequest],
    ) -> ConnectorResult<Vec<ProcessOutcome>> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(
                self.process(&request.id, &request.version, request.scan_only)
                    .await?,
            );
        }
        Ok(outcomes)
    }

    pub async fn process(
        &self,
        id: &str,
        version: &str,
        scan_only: bool,
    ) -> ConnectorResult<ProcessOutcome> {
        if scan_only {
            return Ok(ProcessOutcome::Skipped);
        }

        let started_at = self.clock.now_millis();

        // URL before content, so a document changing in between cannot
        // leave us with content and no URL.
        let located = match self.locate(id).await {
            Ok(located) => located,
            Err(e) => return isolate(id, e),
        };

        let Some((url, record)) = located else {
            debug!("Document '{}' not found, deleting", id);
            return match self.sink.delete(id).await {
                Ok(()) => Ok(ProcessOutcome::Deleted),
                Err(e) => isolate(id, e),
            };
        };

        let mut transferred = 0u64;
        let result = self
            .ingest(id, version, &url, record, &mut transferred)
            .await;

        let (status, message) = match &result {
            Ok(()) => (ActivityStatus::Ok, None),
            Err(ConnectorError::Cancelled) => return Err(ConnectorError::Cancelled),
            Err(e) => (ActivityStatus::Error, Some(e.to_string())),
        };

        let activity = FetchActivity::new(
            ACTIVITY_FETCH,
            started_at,
            transferred,
            id,
            status,
            message,
        );
        if let Err(e) = self.sink.record_activity(activity).await {
            if e.is_cancelled() {
                return Err(e);
            }
            warn!("Failed to record fetch activity for '{}': {}", id, e);
        }

        match result {
            Ok(()) => Ok(ProcessOutcome::Ingested { bytes: transferred }),
            Err(e) => isolate(id, e),
        }
    }

    /// URL and full record, or `None` when either says the document is gone.
    async fn locate(&self, id: &str) -> ConnectorResult<Option<(String, DocumentRecord)>> {
        let Some(url) = self
            .client
            .document_url(id)
            .await
            .map_err(|e| ConnectorError::from_document_error(id, e))?
        else {
            return Ok(None);
        };

        let record = self
            .client
            .get_document(id)
            .await
            .map_err(|e| ConnectorError::from_document_error(id, e))?;

        Ok(record.map(|record| (url, record)))
    }

    /// Stream content, copy selected metadata and ACLs, hand off to the sink.
    /// The record is dropped, and its content released, when this returns.
    async fn ingest(
        &self,
        id: &str,
        version: &str,
        url: &str,
        mut record: DocumentRecord,
        transferred: &mut u64,
    ) -> ConnectorResult<()> {
        let declared_length = record.declared_length();
        let content = match record.take_content() {
            Some(stream) => read_content(id, stream, declared_length, transferred).await?,
            None => Vec::new(),
        };

        let names = VersionToken::metadata_names_of(version).map_err(|e| ConnectorError::Document {
            id: id.to_string(),
            message: e.to_string(),
        })?;

        let mut fields = BTreeMap::new();
        for name in names {
            if let Some(values) = record.metadata(&name) {
                fields.insert(name, values.to_vec());
            }
        }

        let (allow_tokens, deny_tokens) = compose_acl(&record);
        let document = ComposedDocument {
            content,
            declared_length,
            mime_type: record.mime_type().map(String::from),
            fields,
            allow_tokens,
            deny_tokens,
        };

        self.sink.ingest(id, version, url, document).await.map_err(|e| match e {
            ConnectorError::Cancelled => ConnectorError::Cancelled,
            other => ConnectorError::Document {
                id: id.to_string(),
                message: other.to_string(),
            },
        })
    }
}

/// Read the whole body, counting bytes as they arrive.
async fn read_content(
    id: &str,
    mut stream: ContentStream,
    declared_length: u64,
    transferred: &mut u64,
) -> ConnectorResult<Vec<u8>> {
    let mut content = Vec::with_capacity(declared_length.min(16 * 1024 * 1024) as usize);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(ConnectorError::Cancelled),
            Err(e) => {
                return Err(ConnectorError::Document {
                    id: id.to_string(),
                    message: format!("Error transferring content: {}", e),
                })
            }
        };
        content.extend_from_slice(&buf[..n]);
        *transferred += n as u64;
    }
    Ok(content)
}

/// Turn a document-scoped error into a failed outcome; cancellation still propagates.
fn isolate(id: &str, err: ConnectorError) -> ConnectorResult<ProcessOutcome> {
    match err {
        ConnectorError::Cancelled => Err(ConnectorError::Cancelled),
        other => {
            warn!("Error processing document '{}': {}", id, other);
            Ok(ProcessOutcome::Failed {
                message: other.to_string(),
            })
        }
    }
}
