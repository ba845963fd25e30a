use crate::domain::models::TimeWindow;
use crate::domain::repository::{
    DocumentIdStream, DocumentRecord, RepositoryClient, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use base64::Engine;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// Client for a repository exposed over its thin REST API.
pub struct HttpRepositoryClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    metadata_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UrlResponse {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatedResponse {
    updated_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    /// Base64-encoded content body.
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, Vec<String>>,
    #[serde(default)]
    allowed: Vec<String>,
    #[serde(default)]
    disallowed: Vec<String>,
}

impl HttpRepositoryClient {
    /// Build a client for the repository at `base_url`. No request is made.
    pub fn connect(base_url: &str) -> RepositoryResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RepositoryError::Invalid(format!("bad repository URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RepositoryError::Invalid(format!(
                "bad repository URL '{}'",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RepositoryError::Invalid(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Base URL with `segments` appended, each escaped as one path segment.
    fn endpoint(&self, segments: &[&str]) -> RepositoryResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RepositoryError::Invalid(format!("bad repository URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, query: &[(String, String)]) -> RepositoryResult<Option<Response>> {
        debug!("Repository request: GET {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            status if status.is_success() => Ok(Some(response)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(status_error(response).await),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        query: &[(String, String)],
    ) -> RepositoryResult<Option<T>> {
        match self.get(url, query).await? {
            Some(response) => response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| RepositoryError::Failed(format!("Failed to parse repository response: {}", e))),
            None => Ok(None),
        }
    }
}

fn request_error(err: reqwest::Error) -> RepositoryError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RepositoryError::Unavailable {
            message: format!("Repository request failed: {}", err),
            retry_after: None,
        }
    } else {
        RepositoryError::Failed(format!("Repository request failed: {}", err))
    }
}

async fn status_error(response: Response) -> RepositoryError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    let message = format!("Repository returned {}: {}", status, body);

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RepositoryError::Unavailable {
            message,
            retry_after,
        }
    } else {
        RepositoryError::Failed(message)
    }
}

#[async_trait]
impl RepositoryClient for HttpRepositoryClient {
    async fn sanity_check(&self) -> RepositoryResult<()> {
        match self.get(self.endpoint(&["health"])?, &[]).await? {
            Some(_) => Ok(()),
            None => Err(RepositoryError::Absent(self.base_url.to_string())),
        }
    }

    async fn metadata_names(&self) -> RepositoryResult<Vec<String>> {
        self.get_json::<MetadataResponse>(self.endpoint(&["metadata"])?, &[])
            .await?
            .map(|r| r.metadata_names)
            .ok_or_else(|| RepositoryError::Absent(self.base_url.to_string()))
    }

    async fn find_documents(
        &self,
        window: TimeWindow,
        criteria: HashMap<String, String>,
    ) -> RepositoryResult<DocumentIdStream> {
        let url = self.endpoint(&["documents"])?;
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(start) = window.start {
            query.push(("start".to_string(), start.to_string()));
        }
        if let Some(end) = window.end {
            query.push(("end".to_string(), end.to_string()));
        }
        query.extend(criteria);

        // A missing find endpoint must not read as "nothing changed".
        let ids = self
            .get_json::<FindResponse>(url.clone(), &query)
            .await?
            .map(|r| r.ids)
            .ok_or_else(|| RepositoryError::Absent(url.to_string()))?;

        Ok(stream::iter(ids.into_iter().map(Ok)).boxed())
    }

    async fn document_url(&self, id: &str) -> RepositoryResult<Option<String>> {
        let url = self.endpoint(&["documents", id, "url"])?;
        Ok(self.get_json::<UrlResponse>(url, &[]).await?.and_then(|r| r.url))
    }

    async fn get_document(&self, id: &str) -> RepositoryResult<Option<DocumentRecord>> {
        let url = self.endpoint(&["documents", id])?;
        let Some(doc) = self.get_json::<DocumentResponse>(url, &[]).await? else {
            return Ok(None);
        };

        let record = match doc.content {
            Some(encoded) => {
                let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(cleaned)
                    .map_err(|e| RepositoryError::Failed(format!("Failed to decode content: {}", e)))?;
                let length = bytes.len() as u64;
                DocumentRecord::new(Box::new(Cursor::new(bytes)), length)
            }
            None => DocumentRecord::empty(),
        };

        Ok(Some(
            record
                .with_mime_type(doc.mime_type)
                .with_metadata(doc.metadata)
                .with_allowed(doc.allowed)
                .with_disallowed(doc.disallowed),
        ))
    }

    async fn document_updated_time(&self, id: &str) -> RepositoryResult<Option<i64>> {
        let url = self.endpoint(&["documents", id, "updated"])?;
        Ok(self
            .get_json::<UpdatedResponse>(url, &[])
            .await?
            .and_then(|r| r.updated_at))
    }
}
