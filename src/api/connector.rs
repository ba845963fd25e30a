use crate::api::require_user;
use crate::api::response::success_response;
use crate::domain::connector::{
    CheckStatus, ConnectorDescriptor, ProcessOutcome, ProcessRequest, RepositoryConnector,
};
use crate::domain::models::{DocumentSpecification, SpecificationConfig, TimeWindow};
use crate::error::AppResult;
use crate::storage::StorageSink;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct InfoData {
    #[serde(flatten)]
    pub descriptor: ConnectorDescriptor,
    pub connected: bool,
    pub bins: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckData {
    #[serde(flatten)]
    pub status: CheckStatus,
    pub display: String,
}

#[derive(Debug, Serialize)]
pub struct MetadataData {
    pub metadata: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedRequest {
    #[serde(default)]
    pub specification: SpecificationConfig,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SeedData {
    pub window: TimeWindow,
    pub emitted: usize,
    pub frontier: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VersionsRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub specification: SpecificationConfig,
}

#[derive(Debug, Deserialize)]
pub struct ProcessDocumentsRequest {
    pub documents: Vec<ProcessRequest>,
}

#[derive(Debug, Serialize)]
pub struct ProcessedItem {
    pub id: String,
    #[serde(flatten)]
    pub outcome: ProcessOutcome,
}

/// Describe the connector's host contract.
/// GET /api/connector/info
pub async fn info(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
) -> AppResult<HttpResponse> {
    require_user(&req, &app_state)?;

    Ok(success_response(InfoData {
        descriptor: RepositoryConnector::descriptor(),
        connected: app_state.connector.is_connected().await,
        bins: app_state.connector.bin_names("").await,
    }))
}

/// Operator connectivity test.
/// GET /api/connector/check
pub async fn check(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
) -> AppResult<HttpResponse> {
    require_user(&req, &app_state)?;

    let status = app_state.connector.check().await;
    Ok(success_response(CheckData {
        display: status.to_string(),
        status,
    }))
}

/// Metadata field names available for selection, sorted.
/// GET /api/connector/metadata
pub async fn metadata(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
) -> AppResult<HttpResponse> {
    require_user(&req, &app_state)?;

    let metadata = app_state.connector.metadata_names().await?;
    Ok(success_response(MetadataData { metadata }))
}

/// Seed the frontier for a time window.
/// POST /api/connector/seeds
pub async fn add_seeds(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
    body: web::Json<SeedRequest>,
) -> AppResult<HttpResponse> {
    require_user(&req, &app_state)?;

    let body = body.into_inner();
    let spec = DocumentSpecification::from_config(body.specification)?;
    let window = TimeWindow::new(body.start, body.end);
    let frontier = StorageSink::new(Arc::clone(&app_state.storage));

    let emitted = app_state
        .connector
        .add_seed_documents(&spec, window, &frontier)
        .await?;
    info!("Seeded {} documents for window {}", emitted, window);

    Ok(success_response(SeedData {
        window,
        emitted,
        frontier: app_state.storage.frontier().await?,
    }))
}

/// Resolve version tokens; documents absent from the repository map to null.
/// POST /api/connector/versions
pub async fn document_versions(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
    body: web::Json<VersionsRequest>,
) -> AppResult<HttpResponse> {
    require_user(&req, &app_state)?;

    let body = body.into_inner();
    let spec = DocumentSpecification::from_config(body.specification)?;
    let versions = app_state
        .connector
        .document_versions(&body.ids, &spec)
        .await?;
    app_state.connector.release_document_versions(&body.ids);

    let encoded: BTreeMap<String, Option<String>> = versions
        .into_iter()
        .map(|(id, token)| (id, token.map(|t| t.encode())))
        .collect();
    Ok(success_response(encoded))
}

/// Fetch and ingest documents at the versions given.
/// POST /api/connector/process
pub async fn process_documents(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
    body: web::Json<ProcessDocumentsRequest>,
) -> AppResult<HttpResponse> {
    require_user(&req, &app_state)?;

    let requests = body.into_inner().documents;
    let outcomes = app_state
        .connector
        .process_documents(&requests, app_state.sink.as_ref())
        .await?;

    let items: Vec<ProcessedItem> = requests
        .into_iter()
        .zip(outcomes)
        .map(|(request, outcome)| ProcessedItem {
            id: request.id,
            outcome,
        })
        .collect();
    Ok(success_response(items))
}
