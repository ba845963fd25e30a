pub mod connector;
pub mod health;
pub mod jobs;
pub mod response;

use crate::error::{AppError, AppResult};
use crate::middleware::extract_user_id_from_http_request;
use actix_web::{web, HttpRequest};
use uuid::Uuid;

/// Configure all API routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Connector endpoints
    cfg.service(
        web::scope("/api/connector")
            .route("/info", web::get().to(connector::info))
            .route("/check", web::get().to(connector::check))
            .route("/metadata", web::get().to(connector::metadata))
            .route("/seeds", web::post().to(connector::add_seeds))
            .route("/versions", web::post().to(connector::document_versions))
            .route("/process", web::post().to(connector::process_documents))
    );

    // Crawl jobs
    cfg.service(
        web::scope("/api/jobs")
            .route("", web::post().to(jobs::start_crawl))
            .route("/{id}", web::get().to(jobs::get_job))
    );

    cfg.route("/api/documents", web::get().to(jobs::list_documents));
    cfg.route("/api/activities", web::get().to(jobs::list_activities));

    // Health endpoints
    cfg.service(
        web::scope("")
            .route("/health", web::get().to(health::health_check))
            .route("/status", web::get().to(health::status))
    );
}

/// Resolve the calling user or fail with 401.
pub(crate) fn require_user(req: &HttpRequest, app_state: &crate::AppState) -> AppResult<Uuid> {
    extract_user_id_from_http_request(req, app_state.config.jwt_secret.as_deref())
        .ok_or_else(|| AppError::Unauthorized("Missing or invalid authorization".to_string()))
}
