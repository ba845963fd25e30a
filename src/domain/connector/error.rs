use crate::domain::repository::RepositoryError;
use std::time::Duration;
use thiserror::Error;

/// Suggested delay before retrying after a transient repository failure.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Errors surfaced by the connector to its host.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Permanent condition; the job cannot proceed until configuration changes.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Recoverable condition; the caller should back off and retry.
    #[error("Transient error: {message}")]
    Transient { message: String, retry_after: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    /// Batch-fatal repository failure.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Failure isolated to a single document.
    #[error("Document '{id}': {message}")]
    Document { id: String, message: String },

    /// Failure reported by an ingestion or frontier sink.
    #[error("Sink error: {0}")]
    Sink(String),
}

impl ConnectorError {
    /// Classify a failure to establish a repository session.
    pub fn from_session_error(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Interrupted => ConnectorError::Cancelled,
            RepositoryError::Unavailable {
                message,
                retry_after,
            } => ConnectorError::Transient {
                message: format!("Session setup error: {}", message),
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            },
            other => ConnectorError::Configuration(format!("Session setup error: {}", other)),
        }
    }

    /// Classify a repository failure that aborts a whole batch.
    pub fn from_batch_error(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Interrupted => ConnectorError::Cancelled,
            RepositoryError::Unavailable {
                message,
                retry_after,
            } => ConnectorError::Transient {
                message,
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            },
            other => ConnectorError::Repository(other.to_string()),
        }
    }

    /// Classify a repository failure scoped to one document.
    pub fn from_document_error(id: &str, err: RepositoryError) -> Self {
        match err {
            RepositoryError::Interrupted => ConnectorError::Cancelled,
            other => ConnectorError::Document {
                id: id.to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectorError::Cancelled)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectorError::Transient { .. })
    }

    /// Retry hint for transient errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ConnectorError::Transient { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
