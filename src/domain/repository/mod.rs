pub mod filesystem;

use crate::clients::HttpRepositoryClient;
use crate::domain::models::TimeWindow;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Errors reported by a repository client.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A blocking wait was interrupted.
    #[error("Interrupted")]
    Interrupted,

    /// The repository is temporarily unreachable.
    #[error("Repository unavailable: {message}")]
    Unavailable {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The repository itself does not exist at the configured locator.
    #[error("Repository not found: {0}")]
    Absent(String),

    /// The locator or repository layout is invalid.
    #[error("Invalid repository: {0}")]
    Invalid(String),

    #[error("{0}")]
    Failed(String),
}

impl From<io::Error> for RepositoryError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::Interrupted => RepositoryError::Interrupted,
            io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => RepositoryError::Unavailable {
                message: err.to_string(),
                retry_after: None,
            },
            _ => RepositoryError::Failed(format!("IO error: {}", err)),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Lazy sequence of document identifiers returned by a find query.
pub type DocumentIdStream = BoxStream<'static, RepositoryResult<String>>;

/// Content body of a fetched document.
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

/// Everything fetched for one document: content, metadata and access lists.
///
/// The content stream is released when the record (or the stream taken out
/// of it) is dropped.
pub struct DocumentRecord {
    content: Option<ContentStream>,
    declared_length: u64,
    mime_type: Option<String>,
    metadata: HashMap<String, Vec<String>>,
    allowed: Vec<String>,
    disallowed: Vec<String>,
}

impl DocumentRecord {
    pub fn new(content: ContentStream, declared_length: u64) -> Self {
        Self {
            content: Some(content),
            declared_length,
            mime_type: None,
            metadata: HashMap::new(),
            allowed: Vec::new(),
            disallowed: Vec::new(),
        }
    }

    /// Record with no content body.
    pub fn empty() -> Self {
        Self {
            content: None,
            declared_length: 0,
            mime_type: None,
            metadata: HashMap::new(),
            allowed: Vec::new(),
            disallowed: Vec::new(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Vec<String>>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_allowed(mut self, allowed: Vec<String>) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn with_disallowed(mut self, disallowed: Vec<String>) -> Self {
        self.disallowed = disallowed;
        self
    }

    pub fn declared_length(&self) -> u64 {
        self.declared_length
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Values of one metadata field, if the document carries it.
    pub fn metadata(&self, name: &str) -> Option<&[String]> {
        self.metadata.get(name).map(Vec::as_slice)
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    pub fn disallowed(&self) -> &[String] {
        &self.disallowed
    }

    /// Move the content stream out of the record. Subsequent calls return `None`.
    pub fn take_content(&mut self) -> Option<ContentStream> {
        self.content.take()
    }
}

impl std::fmt::Debug for DocumentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRecord")
            .field("has_content", &self.content.is_some())
            .field("declared_length", &self.declared_length)
            .field("mime_type", &self.mime_type)
            .field("metadata", &self.metadata)
            .field("allowed", &self.allowed)
            .field("disallowed", &self.disallowed)
            .finish()
    }
}

/// Session-scoped handle to the backing content repository.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Verify the repository is reachable and well-formed.
    async fn sanity_check(&self) -> RepositoryResult<()>;

    /// Metadata field names the repository defines.
    async fn metadata_names(&self) -> RepositoryResult<Vec<String>>;

    /// Find documents updated inside `window` whose metadata matches every
    /// entry of `criteria`.
    async fn find_documents(
        &self,
        window: TimeWindow,
        criteria: HashMap<String, String>,
    ) -> RepositoryResult<DocumentIdStream>;

    async fn document_url(&self, id: &str) -> RepositoryResult<Option<String>>;

    /// Fetch the full document, or `None` when it does not exist.
    async fn get_document(&self, id: &str) -> RepositoryResult<Option<DocumentRecord>>;

    /// Last update time in epoch milliseconds, or `None` when the document does not exist.
    async fn document_updated_time(&self, id: &str) -> RepositoryResult<Option<i64>>;
}

/// Opens repository sessions from a locator string.
#[async_trait]
pub trait RepositoryFactory: Send + Sync {
    async fn open(&self, locator: &str) -> RepositoryResult<Arc<dyn RepositoryClient>>;
}

/// Chooses the repository client from the locator scheme: `http(s)://` URLs
/// go to the HTTP client, anything else is a filesystem root.
pub struct DefaultRepositoryFactory;

impl DefaultRepositoryFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DefaultRepositoryFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepositoryFactory for DefaultRepositoryFactory {
    async fn open(&self, locator: &str) -> RepositoryResult<Arc<dyn RepositoryClient>> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(RepositoryError::Invalid("empty repository locator".to_string()));
        }

        if locator.starts_with("http://") || locator.starts_with("https://") {
            Ok(Arc::new(HttpRepositoryClient::connect(locator)?))
        } else {
            Ok(Arc::new(filesystem::FsRepository::open(locator).await?))
        }
    }
}
