use actix_web::{web, HttpResponse};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct StatusResponse {
    service: String,
    version: String,
    status: String,
    uptime_seconds: u64,
    repository: String,
    connected: bool,
    session_live: bool,
    session_expires_at: Option<i64>,
}

/// Health check endpoint.
/// GET /health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Status endpoint with detailed information.
/// GET /status
pub async fn status(app_state: web::Data<crate::AppState>) -> HttpResponse {
    let uptime = app_state.started_at.elapsed().as_secs();
    let session = app_state.connector.session_status().await;

    HttpResponse::Ok().json(StatusResponse {
        service: "repo-connector".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        uptime_seconds: uptime,
        repository: app_state.config.repository_root.clone(),
        connected: session.is_some(),
        session_live: session.as_ref().is_some_and(|s| s.live),
        session_expires_at: session.and_then(|s| s.expires_at),
    })
}
