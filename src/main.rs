mod api;
mod clients;
mod config;
mod domain;
mod error;
mod middleware;
mod storage;
#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clients::IngestionClient;
use config::Config;
use domain::connector::RepositoryConnector;
use domain::repository::DefaultRepositoryFactory;
use domain::sink::IngestionSink;
use domain::sync::CrawlOrchestrator;
use storage::memory::InMemoryStorage;
use storage::{Storage, StorageSink};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
pub struct AppState {
    pub config: Config,
    pub connector: Arc<RepositoryConnector>,
    pub storage: Arc<dyn Storage>,
    pub sink: Arc<dyn IngestionSink>,
    pub orchestrator: Arc<CrawlOrchestrator>,
    pub started_at: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repo_connector=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    info!("Starting repo-connector on port {}", port);
    info!("Repository: {}", config.repository_root);

    // Bind the connector; the session opens on first use
    let connector = Arc::new(RepositoryConnector::new(
        Arc::new(DefaultRepositoryFactory::new()),
        config.session_lease,
    ));
    connector.connect(&config.repository_root).await;

    // Initialize storage and the ingestion sink
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let sink: Arc<dyn IngestionSink> = match config.ingestion_service_url {
        Some(ref url) => {
            info!("Ingestion service URL: {}", url);
            Arc::new(IngestionClient::new(url.clone(), config.internal_api_key.clone()))
        }
        None => {
            info!("No ingestion service configured; documents stay in the local store");
            Arc::new(StorageSink::new(Arc::clone(&storage)))
        }
    };
    let orchestrator = Arc::new(CrawlOrchestrator::new(
        Arc::clone(&connector),
        Arc::clone(&storage),
        Arc::clone(&sink),
    ));

    // Idle check: expire the session once its lease has run out
    let poller = Arc::clone(&connector);
    let poll_interval = config.poll_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if poller.poll().await {
                debug!("Idle repository session released");
            }
        }
    });

    // Create app state
    let app_state = web::Data::new(AppState {
        config: config.clone(),
        connector,
        storage,
        sink,
        orchestrator,
        started_at: Instant::now(),
    });

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::HeaderName::from_static("x-correlation-id"),
            ])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(app_state.clone())
            .configure(api::configure_routes)
    })
    .bind(("0.0.0.0", port))
    .with_context(|| format!("failed to bind port {}", port))?
    .run()
    .await
    .context("HTTP server terminated")
}
