use crate::api::require_user;
use crate::api::response::{accepted_response, success_response};
use crate::domain::models::{DocumentSpecification, SpecificationConfig};
use crate::error::{AppError, AppResult};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StartCrawlRequest {
    #[serde(default)]
    pub specification: SpecificationConfig,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DocumentItem {
    pub id: String,
    pub version: String,
    pub url: String,
    pub mime_type: Option<String>,
    pub bytes: usize,
    pub fields: std::collections::BTreeMap<String, Vec<String>>,
    pub allow_tokens: Vec<String>,
    pub deny_tokens: Vec<String>,
    pub ingested_at: String,
}

/// Start a crawl job in the background.
/// POST /api/jobs
pub async fn start_crawl(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
    body: web::Json<StartCrawlRequest>,
) -> AppResult<HttpResponse> {
    let user_id = require_user(&req, &app_state)?;

    let spec = DocumentSpecification::from_config(body.into_inner().specification)?;
    let job = app_state.orchestrator.start_crawl(spec, Some(user_id)).await?;
    info!("Crawl job {} started for user {}", job.id, user_id);

    Ok(accepted_response(job))
}

/// Get a crawl job by ID.
/// GET /api/jobs/{id}
pub async fn get_job(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    require_user(&req, &app_state)?;

    let job_id = path.into_inner();
    let job = app_state
        .storage
        .get_job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Crawl job {} not found", job_id)))?;

    Ok(success_response(job))
}

/// List documents held by the local ingestion store.
/// GET /api/documents
pub async fn list_documents(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
) -> AppResult<HttpResponse> {
    require_user(&req, &app_state)?;

    let documents: Vec<DocumentItem> = app_state
        .storage
        .list_documents()
        .await?
        .into_iter()
        .map(|d| DocumentItem {
            bytes: d.document.content.len(),
            id: d.id,
            version: d.version,
            url: d.url,
            mime_type: d.document.mime_type,
            fields: d.document.fields,
            allow_tokens: d.document.allow_tokens,
            deny_tokens: d.document.deny_tokens,
            ingested_at: d.ingested_at.to_rfc3339(),
        })
        .collect();

    Ok(success_response(documents))
}

/// Most recent fetch activities.
/// GET /api/activities?limit=N
pub async fn list_activities(
    req: HttpRequest,
    app_state: web::Data<crate::AppState>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    require_user(&req, &app_state)?;

    let activities = app_state
        .storage
        .list_activities(query.limit.unwrap_or(100))
        .await?;
    Ok(success_response(activities))
}
