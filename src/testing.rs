//! Mock collaborators shared by unit tests.

use crate::domain::connector::session::Clock;
use crate::domain::connector::{ConnectorError, ConnectorResult};
use crate::domain::models::{ComposedDocument, FetchActivity, TimeWindow};
use crate::domain::repository::{
    DocumentIdStream, DocumentRecord, RepositoryClient, RepositoryError, RepositoryFactory,
    RepositoryResult,
};
use crate::domain::sink::{FrontierSink, IngestionSink};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

type ErrorFn = fn() -> RepositoryError;

// ============================================================================
// Clock
// ============================================================================

pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Content body that can fail part-way and counts how often it is dropped.
struct MockContent {
    data: Vec<u8>,
    pos: usize,
    fail_after: Option<(usize, io::ErrorKind)>,
    released: Arc<AtomicUsize>,
}

impl AsyncRead for MockContent {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let limit = this
            .fail_after
            .map_or(this.data.len(), |(n, _)| n.min(this.data.len()));
        if this.pos >= limit {
            if let Some((_, kind)) = this.fail_after {
                return Poll::Ready(Err(io::Error::new(kind, "stream reset")));
            }
            return Poll::Ready(Ok(()));
        }
        let n = (limit - this.pos).min(buf.remaining()).min(7);
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

impl Drop for MockContent {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct MockDocument {
    url: Option<String>,
    updated_at: i64,
    content: Vec<u8>,
    fail_after: Option<(usize, io::ErrorKind)>,
    metadata: HashMap<String, Vec<String>>,
    allowed: Vec<String>,
    disallowed: Vec<String>,
    missing_on_fetch: bool,
    released: Arc<AtomicUsize>,
}

impl MockDocument {
    pub fn new(updated_at: i64) -> Self {
        Self {
            url: Some(String::new()),
            updated_at,
            content: Vec::new(),
            fail_after: None,
            metadata: HashMap::new(),
            allowed: Vec::new(),
            disallowed: Vec::new(),
            missing_on_fetch: false,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn without_url(mut self) -> Self {
        self.url = None;
        self
    }

    /// URL lookup succeeds but the full fetch reports "not found".
    pub fn missing_on_fetch(mut self) -> Self {
        self.missing_on_fetch = true;
        self
    }

    pub fn with_content(mut self, content: &[u8]) -> Self {
        self.content = content.to_vec();
        self
    }

    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some((bytes, io::ErrorKind::ConnectionReset));
        self
    }

    pub fn interrupted_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some((bytes, io::ErrorKind::Interrupted));
        self
    }

    pub fn with_metadata(mut self, name: &str, values: &[&str]) -> Self {
        self.metadata
            .insert(name.to_string(), values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_allowed(mut self, tokens: &[&str]) -> Self {
        self.allowed = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_disallowed(mut self, tokens: &[&str]) -> Self {
        self.disallowed = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.released)
    }

    fn record(&self) -> DocumentRecord {
        let content = MockContent {
            data: self.content.clone(),
            pos: 0,
            fail_after: self.fail_after,
            released: Arc::clone(&self.released),
        };
        DocumentRecord::new(Box::new(content), self.content.len() as u64)
            .with_metadata(self.metadata.clone())
            .with_allowed(self.allowed.clone())
            .with_disallowed(self.disallowed.clone())
    }
}

#[derive(Default)]
struct RepositoryState {
    documents: HashMap<String, MockDocument>,
    find_results: HashMap<(String, String), Vec<String>>,
    find_errors: HashMap<(String, String), ErrorFn>,
    updated_errors: HashMap<String, ErrorFn>,
    fetch_errors: HashMap<String, ErrorFn>,
    sanity_error: Option<ErrorFn>,
    metadata_names: Vec<String>,
    find_calls: Vec<(TimeWindow, String, String)>,
    url_lookups: usize,
    document_fetches: usize,
}

/// In-memory repository with scripted results and failures.
#[derive(Default)]
pub struct MockRepository {
    state: Mutex<RepositoryState>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&self, id: &str, mut document: MockDocument) {
        if document.url.as_deref() == Some("") {
            document.url = Some(format!("http://repo/{}", id));
        }
        self.state.lock().unwrap().documents.insert(id.to_string(), document);
    }

    pub fn remove_document(&self, id: &str) {
        self.state.lock().unwrap().documents.remove(id);
    }

    pub fn set_find_result(&self, name: &str, value: &str, ids: Vec<&str>) {
        self.state.lock().unwrap().find_results.insert(
            (name.to_string(), value.to_string()),
            ids.into_iter().map(String::from).collect(),
        );
    }

    pub fn set_find_error(&self, name: &str, value: &str, error: ErrorFn) {
        self.state
            .lock()
            .unwrap()
            .find_errors
            .insert((name.to_string(), value.to_string()), error);
    }

    pub fn set_updated_error(&self, id: &str, error: ErrorFn) {
        self.state.lock().unwrap().updated_errors.insert(id.to_string(), error);
    }

    pub fn set_fetch_error(&self, id: &str, error: ErrorFn) {
        self.state.lock().unwrap().fetch_errors.insert(id.to_string(), error);
    }

    pub fn set_sanity_error(&self, error: Option<ErrorFn>) {
        self.state.lock().unwrap().sanity_error = error;
    }

    pub fn set_metadata_names(&self, names: &[&str]) {
        self.state.lock().unwrap().metadata_names = names.iter().map(|n| n.to_string()).collect();
    }

    pub fn find_calls(&self) -> Vec<(TimeWindow, String, String)> {
        self.state.lock().unwrap().find_calls.clone()
    }

    pub fn url_lookups(&self) -> usize {
        self.state.lock().unwrap().url_lookups
    }

    pub fn document_fetches(&self) -> usize {
        self.state.lock().unwrap().document_fetches
    }
}

#[async_trait]
impl RepositoryClient for MockRepository {
    async fn sanity_check(&self) -> RepositoryResult<()> {
        match self.state.lock().unwrap().sanity_error {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    async fn metadata_names(&self) -> RepositoryResult<Vec<String>> {
        Ok(self.state.lock().unwrap().metadata_names.clone())
    }

    async fn find_documents(
        &self,
        window: TimeWindow,
        criteria: HashMap<String, String>,
    ) -> RepositoryResult<DocumentIdStream> {
        let mut state = self.state.lock().unwrap();
        let mut ids = Vec::new();
        for (name, value) in criteria {
            state.find_calls.push((window, name.clone(), value.clone()));
            let key = (name, value);
            if let Some(error) = state.find_errors.get(&key) {
                return Err(error());
            }
            ids.extend(state.find_results.get(&key).cloned().unwrap_or_default());
        }
        Ok(stream::iter(ids.into_iter().map(Ok)).boxed())
    }

    async fn document_url(&self, id: &str) -> RepositoryResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.url_lookups += 1;
        if let Some(error) = state.fetch_errors.get(id) {
            return Err(error());
        }
        Ok(state.documents.get(id).and_then(|d| d.url.clone()))
    }

    async fn get_document(&self, id: &str) -> RepositoryResult<Option<DocumentRecord>> {
        let mut state = self.state.lock().unwrap();
        state.document_fetches += 1;
        if let Some(error) = state.fetch_errors.get(id) {
            return Err(error());
        }
        Ok(state
            .documents
            .get(id)
            .filter(|d| !d.missing_on_fetch)
            .map(MockDocument::record))
    }

    async fn document_updated_time(&self, id: &str) -> RepositoryResult<Option<i64>> {
        let state = self.state.lock().unwrap();
        if let Some(error) = state.updated_errors.get(id) {
            return Err(error());
        }
        Ok(state.documents.get(id).map(|d| d.updated_at))
    }
}

/// Factory handing out one shared mock repository, or a scripted failure.
pub struct MockFactory {
    repository: Arc<MockRepository>,
    failure: Option<ErrorFn>,
    opens: AtomicUsize,
    locators: Mutex<Vec<String>>,
}

impl MockFactory {
    pub fn new(repository: MockRepository) -> Self {
        Self {
            repository: Arc::new(repository),
            failure: None,
            opens: AtomicUsize::new(0),
            locators: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ErrorFn) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(MockRepository::new())
        }
    }

    pub fn repository(&self) -> Arc<MockRepository> {
        Arc::clone(&self.repository)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn locators(&self) -> Vec<String> {
        self.locators.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositoryFactory for MockFactory {
    async fn open(&self, locator: &str) -> RepositoryResult<Arc<dyn RepositoryClient>> {
        self.locators.lock().unwrap().push(locator.to_string());
        if let Some(error) = self.failure {
            return Err(error());
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.repository.clone())
    }
}

// ============================================================================
// Sinks
// ============================================================================

pub type IngestCall = (String, String, String, ComposedDocument);

#[derive(Default)]
pub struct RecordingSink {
    ingested: Mutex<Vec<IngestCall>>,
    deleted: Mutex<Vec<String>>,
    activities: Mutex<Vec<FetchActivity>>,
    ingest_failure: Mutex<Option<String>>,
    delete_failure: Mutex<Option<fn() -> ConnectorError>>,
}

impl RecordingSink {
    pub fn fail_ingest(&self, message: &str) {
        *self.ingest_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_delete(&self, error: fn() -> ConnectorError) {
        *self.delete_failure.lock().unwrap() = Some(error);
    }

    pub fn ingested(&self) -> Vec<IngestCall> {
        self.ingested.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn activities(&self) -> Vec<FetchActivity> {
        self.activities.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngestionSink for RecordingSink {
    async fn ingest(
        &self,
        id: &str,
        version: &str,
        url: &str,
        document: ComposedDocument,
    ) -> ConnectorResult<()> {
        if let Some(message) = self.ingest_failure.lock().unwrap().clone() {
            return Err(ConnectorError::Sink(message));
        }
        self.ingested.lock().unwrap().push((
            id.to_string(),
            version.to_string(),
            url.to_string(),
            document,
        ));
        Ok(())
    }

    async fn delete(&self, id: &str) -> ConnectorResult<()> {
        if let Some(error) = *self.delete_failure.lock().unwrap() {
            return Err(error());
        }
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn record_activity(&self, activity: FetchActivity) -> ConnectorResult<()> {
        self.activities.lock().unwrap().push(activity);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingFrontier {
    seeds: Mutex<Vec<String>>,
}

impl RecordingFrontier {
    pub fn seeds(&self) -> Vec<String> {
        self.seeds.lock().unwrap().clone()
    }
}

#[async_trait]
impl FrontierSink for RecordingFrontier {
    async fn add_seed(&self, id: &str) -> ConnectorResult<()> {
        self.seeds.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Unsigned bearer token for user 00000000-0000-0000-0000-000000000001,
/// accepted when no JWT secret is configured.
pub const BEARER: &str = "Bearer eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIwMDAwMDAwMC0wMDAwLTAwMDAtMDAwMC0wMDAwMDAwMDAwMDEiLCJleHAiOjQxMDI0NDQ4MDB9.sig";

/// Application state over a mock repository and in-memory storage.
pub async fn test_state(factory: Arc<MockFactory>) -> crate::AppState {
    use crate::config::Config;
    use crate::domain::connector::RepositoryConnector;
    use crate::domain::sync::CrawlOrchestrator;
    use crate::storage::memory::InMemoryStorage;
    use crate::storage::{Storage, StorageSink};
    use std::time::{Duration, Instant};

    let config = Config {
        port: 0,
        repository_root: "/repo".to_string(),
        session_lease: Duration::from_secs(300),
        poll_interval: Duration::from_secs(60),
        ingestion_service_url: None,
        internal_api_key: None,
        jwt_secret: None,
    };
    let connector = Arc::new(RepositoryConnector::with_clock(
        factory,
        config.session_lease,
        Arc::new(ManualClock::new(10_000)),
    ));
    connector.connect(&config.repository_root).await;

    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let sink: Arc<dyn IngestionSink> = Arc::new(StorageSink::new(Arc::clone(&storage)));
    let orchestrator = Arc::new(CrawlOrchestrator::new(
        Arc::clone(&connector),
        Arc::clone(&storage),
        Arc::clone(&sink),
    ));

    crate::AppState {
        config,
        connector,
        storage,
        sink,
        orchestrator,
        started_at: Instant::now(),
    }
}

/// Minimal HTTP server answering every request with one canned response and
/// recording the raw requests it received.
pub struct StubServer {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub async fn respond_with(status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let mut response = format!(
            "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n",
            status,
            body.len()
        );
        for (name, value) in headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }
        response.push_str("\r\n");
        response.push_str(body);

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut raw = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    raw.extend_from_slice(&buf[..n]);
                    if request_complete(&raw) {
                        break;
                    }
                }
                recorded
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&raw).into_owned());
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn request_complete(raw: &[u8]) -> bool {
    let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&raw[..end]).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    raw.len() >= end + 4 + length
}

/// Address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
