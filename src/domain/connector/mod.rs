pub mod error;
pub mod processing;
pub mod seeding;
pub mod session;
pub mod version;
pub mod versioning;

pub use error::{ConnectorError, ConnectorResult};
pub use processing::{ProcessOutcome, ProcessRequest, ACTIVITY_FETCH};
pub use session::{Clock, SessionManager, SystemClock, DEFAULT_SESSION_LEASE};
pub use versioning::VersionMap;

use crate::domain::models::{DocumentSpecification, TimeWindow};
use crate::domain::repository::RepositoryFactory;
use crate::domain::sink::{FrontierSink, IngestionSink};
use processing::FetchPipeline;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Static description of how the connector works with its host.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorDescriptor {
    /// Seeding reports additions and changes; deletions are found by versioning.
    pub model: &'static str,
    pub activities: Vec<&'static str>,
    pub relationship_types: Vec<&'static str>,
    pub max_document_request: usize,
}

/// Result of the operator connectivity test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Error(String),
    Transient(String),
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Ok => write!(f, "Connection working"),
            CheckStatus::Error(msg) => write!(f, "Error: {}", msg),
            CheckStatus::Transient(msg) => write!(f, "Transient error: {}", msg),
        }
    }
}

/// Snapshot of the repository session for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub live: bool,
    /// Lease expiry in epoch millis while a handle is held.
    pub expires_at: Option<i64>,
}

/// Repository connector: the host-facing entry point wrapping session
/// management, seeding, versioning and processing.
pub struct RepositoryConnector {
    factory: Arc<dyn RepositoryFactory>,
    lease: Duration,
    clock: Arc<dyn Clock>,
    session: RwLock<Option<Arc<SessionManager>>>,
}

impl RepositoryConnector {
    pub fn new(factory: Arc<dyn RepositoryFactory>, lease: Duration) -> Self {
        Self::with_clock(factory, lease, Arc::new(SystemClock))
    }

    pub fn with_clock(
        factory: Arc<dyn RepositoryFactory>,
        lease: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            factory,
            lease,
            clock,
            session: RwLock::new(None),
        }
    }

    pub fn descriptor() -> ConnectorDescriptor {
        ConnectorDescriptor {
            model: "add_change",
            activities: vec![ACTIVITY_FETCH],
            relationship_types: Vec::new(),
            max_document_request: 1,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Bind the connector to a repository locator. No session is opened yet.
    pub async fn connect(&self, locator: &str) {
        let manager = SessionManager::new(
            Arc::clone(&self.factory),
            locator,
            self.lease,
            Arc::clone(&self.clock),
        );
        let previous = self.session.write().await.replace(Arc::new(manager));
        if let Some(previous) = previous {
            previous.invalidate().await;
        }
        info!("Connector bound to repository '{}'", locator);
    }

    /// Drop the session and forget the locator.
    pub async fn disconnect(&self) {
        if let Some(session) = self.session.write().await.take() {
            session.invalidate().await;
            info!("Connector disconnected from '{}'", session.locator());
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn session(&self) -> ConnectorResult<Arc<SessionManager>> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| ConnectorError::Configuration("connector is not connected".to_string()))
    }

    /// Run the repository sanity check through the session.
    pub async fn check(&self) -> CheckStatus {
        let session = match self.session().await {
            Ok(session) => session,
            Err(e) => return CheckStatus::Error(e.to_string()),
        };
        let client = match session.acquire().await {
            Ok(client) => client,
            Err(e) if e.is_transient() => return CheckStatus::Transient(e.to_string()),
            Err(e) => return CheckStatus::Error(e.to_string()),
        };
        match client.sanity_check().await {
            Ok(()) => CheckStatus::Ok,
            Err(e) => {
                warn!("Error checking repository: {}", e);
                match ConnectorError::from_batch_error(e) {
                    err @ ConnectorError::Transient { .. } => {
                        session.invalidate().await;
                        CheckStatus::Transient(err.to_string())
                    }
                    err => CheckStatus::Error(err.to_string()),
                }
            }
        }
    }

    /// Idle callback from the host. Returns true if a session expired.
    pub async fn poll(&self) -> bool {
        match self.session.read().await.clone() {
            Some(session) => session.poll().await,
            None => false,
        }
    }

    /// Current session state, or None when not connected.
    pub async fn session_status(&self) -> Option<SessionStatus> {
        let session = self.session.read().await.clone()?;
        Some(SessionStatus {
            live: session.is_live().await,
            expires_at: session.expires_at().await,
        })
    }

    /// Throttling bins for a document: one bin per repository.
    pub async fn bin_names(&self, _id: &str) -> Vec<String> {
        match self.session.read().await.as_ref() {
            Some(session) => vec![session.locator().to_string()],
            None => Vec::new(),
        }
    }

    /// Metadata field names defined by the repository, sorted.
    pub async fn metadata_names(&self) -> ConnectorResult<Vec<String>> {
        let session = self.session().await?;
        let client = session.acquire().await?;
        let result = client
            .metadata_names()
            .await
            .map_err(ConnectorError::from_batch_error);
        let mut names = self.guard(&session, result).await?;
        names.sort();
        Ok(names)
    }

    /// Seed the frontier with documents changed inside `window`.
    pub async fn add_seed_documents(
        &self,
        spec: &DocumentSpecification,
        window: TimeWindow,
        frontier: &dyn FrontierSink,
    ) -> ConnectorResult<usize> {
        let session = self.session().await?;
        let client = session.acquire().await?;
        let result =
            seeding::discover_seeds(client.as_ref(), window, &spec.find_criteria, frontier).await;
        let emitted = self.guard(&session, result).await?;
        debug!("Seeded {} documents for window {}", emitted, window);
        Ok(emitted)
    }

    /// Resolve version tokens under the specification's metadata selection.
    pub async fn document_versions(
        &self,
        ids: &[String],
        spec: &DocumentSpecification,
    ) -> ConnectorResult<VersionMap> {
        let session = self.session().await?;
        let client = session.acquire().await?;
        let result = versioning::resolve_versions(client.as_ref(), ids, &spec.metadata).await;
        self.guard(&session, result).await
    }

    /// Fetch and ingest (or delete) each requested document.
    pub async fn process_documents(
        &self,
        requests: &[ProcessRequest],
        sink: &dyn IngestionSink,
    ) -> ConnectorResult<Vec<ProcessOutcome>> {
        let session = self.session().await?;
        let client = session.acquire().await?;
        let pipeline = FetchPipeline::new(client.as_ref(), sink, self.clock.as_ref());
        let result = pipeline.process_batch(requests).await;
        self.guard(&session, result).await
    }

    /// Nothing is held between versioning and processing.
    pub fn release_document_versions(&self, _ids: &[String]) {}

    /// A transient failure means the handle may be broken; drop it so the
    /// next call reconnects.
    async fn guard<T>(
        &self,
        session: &SessionManager,
        result: ConnectorResult<T>,
    ) -> ConnectorResult<T> {
        if let Err(e) = &result {
            if e.is_transient() {
                session.invalidate().await;
            }
        }
        result
    }
}
