use crate::domain::connector::error::DEFAULT_RETRY_AFTER;
use crate::domain::connector::{ConnectorError, ConnectorResult};
use crate::domain::models::{ComposedDocument, FetchActivity};
use crate::domain::sink::IngestionSink;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Client for the downstream ingestion service.
pub struct IngestionClient {
    client: Client,
    base_url: String,
    internal_api_key: Option<String>,
}

/// Request payload for ingesting one document.
#[derive(Debug, Serialize)]
struct IngestRequest<'a> {
    id: &'a str,
    version: &'a str,
    url: &'a str,
    /// Base64-encoded content body.
    content: String,
    declared_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    fields: BTreeMap<String, Vec<String>>,
    allow_tokens: Vec<String>,
    deny_tokens: Vec<String>,
}

impl IngestionClient {
    pub fn new(base_url: String, internal_api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            internal_api_key,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.internal_api_key {
            Some(ref api_key) => request.header("X-Internal-Api-Key", api_key),
            None => request,
        }
    }

    /// Send a request. Unreachable service, throttling and 5xx are transient.
    async fn send(&self, request: RequestBuilder, what: &str) -> ConnectorResult<()> {
        let response = self.authorize(request).send().await.map_err(|e| {
            let message = format!("Ingestion service {} failed: {}", what, e);
            if e.is_connect() || e.is_timeout() {
                ConnectorError::Transient {
                    message,
                    retry_after: DEFAULT_RETRY_AFTER,
                }
            } else {
                ConnectorError::Sink(message)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        let message = format!("Ingestion service returned {} for {}: {}", status, what, body);

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(ConnectorError::Transient {
                message,
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            })
        } else {
            Err(ConnectorError::Sink(message))
        }
    }
}

#[async_trait]
impl IngestionSink for IngestionClient {
    /// Calls: POST {INGESTION_SERVICE_URL}/ingest
    async fn ingest(
        &self,
        id: &str,
        version: &str,
        url: &str,
        document: ComposedDocument,
    ) -> ConnectorResult<()> {
        let endpoint = format!("{}/ingest", self.base_url);
        debug!("Ingesting '{}' ({} bytes) via {}", id, document.content.len(), endpoint);

        let request = IngestRequest {
            id,
            version,
            url,
            content: base64::engine::general_purpose::STANDARD.encode(&document.content),
            declared_length: document.declared_length,
            mime_type: document.mime_type,
            fields: document.fields,
            allow_tokens: document.allow_tokens,
            deny_tokens: document.deny_tokens,
        };
        self.send(self.client.post(&endpoint).json(&request), "ingest").await
    }

    /// Calls: DELETE {INGESTION_SERVICE_URL}/documents?id={id}
    async fn delete(&self, id: &str) -> ConnectorResult<()> {
        let endpoint = format!("{}/documents", self.base_url);
        debug!("Deleting '{}' via {}", id, endpoint);
        self.send(self.client.delete(&endpoint).query(&[("id", id)]), "delete")
            .await
    }

    /// Calls: POST {INGESTION_SERVICE_URL}/activities
    async fn record_activity(&self, activity: FetchActivity) -> ConnectorResult<()> {
        let endpoint = format!("{}/activities", self.base_url);
        self.send(self.client.post(&endpoint).json(&activity), "activity")
            .await
    }
}
