pub mod http_repository;
pub mod ingestion;

pub use http_repository::HttpRepositoryClient;
pub use ingestion::IngestionClient;
