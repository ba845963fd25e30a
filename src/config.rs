use crate::domain::connector::DEFAULT_SESSION_LEASE;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Poll interval used when POLL_INTERVAL_SECS is unset or unusable.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3014)
    pub port: u16,
    /// Repository locator: a directory path or an http(s) URL
    pub repository_root: String,
    /// Lease granted to the repository session on every use
    pub session_lease: Duration,
    /// Interval of the idle session check, never zero
    pub poll_interval: Duration,
    /// Ingestion service URL; when unset, documents go to the local store
    pub ingestion_service_url: Option<String>,
    /// API key for S2S calls to the ingestion service
    pub internal_api_key: Option<String>,
    /// JWT secret for token validation (optional - when not validating locally)
    pub jwt_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let session_lease = positive(&var, "SESSION_LEASE_MS")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SESSION_LEASE);
        let poll_interval = positive(&var, "POLL_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        Self {
            port: parse(&var, "PORT").unwrap_or(3014),
            repository_root: var("REPOSITORY_ROOT").unwrap_or_else(|| "./repository".to_string()),
            session_lease,
            poll_interval,
            ingestion_service_url: var("INGESTION_SERVICE_URL").filter(|v| !v.is_empty()),
            internal_api_key: var("INTERNAL_API_KEY"),
            jwt_secret: var("JWT_SECRET"),
        }
    }
}

fn parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    var(name).and_then(|v| v.trim().parse().ok())
}

/// A duration setting must be positive; zero falls back to the default.
fn positive(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    let value = parse::<u64>(var, name)?;
    if value == 0 {
        warn!("{} must be positive, using the default", name);
        return None;
    }
    Some(value)
}
