use crate::domain::connector::{ConnectorError, ConnectorResult};
use crate::domain::repository::{RepositoryClient, RepositoryFactory};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default lifetime granted to a session on every acquisition.
pub const DEFAULT_SESSION_LEASE: Duration = Duration::from_millis(300_000);

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[derive(Default)]
struct SessionState {
    handle: Option<Arc<dyn RepositoryClient>>,
    expires_at: Option<i64>,
}

/// Owns the single repository handle of a connector instance and its expiry.
pub struct SessionManager {
    factory: Arc<dyn RepositoryFactory>,
    locator: String,
    lease_ms: i64,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn RepositoryFactory>,
        locator: impl Into<String>,
        lease: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            factory,
            locator: locator.into(),
            lease_ms: i64::try_from(lease.as_millis()).unwrap_or(i64::MAX),
            clock,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Return the live handle, opening one if needed. Every success pushes
    /// the expiry deadline to now + lease.
    pub async fn acquire(&self) -> ConnectorResult<Arc<dyn RepositoryClient>> {
        let mut state = self.state.lock().await;

        let handle = match &state.handle {
            Some(handle) => Arc::clone(handle),
            None => {
                let handle = self.factory.open(&self.locator).await.map_err(|e| {
                    let err = ConnectorError::from_session_error(e);
                    if !err.is_cancelled() {
                        warn!("Session setup error for '{}': {}", self.locator, err);
                    }
                    err
                })?;
                info!("Established repository session for '{}'", self.locator);
                state.handle = Some(Arc::clone(&handle));
                handle
            }
        };

        state.expires_at = Some(self.clock.now_millis().saturating_add(self.lease_ms));
        Ok(handle)
    }

    /// Drop the current handle, if any.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if state.handle.take().is_some() {
            debug!("Invalidated repository session for '{}'", self.locator);
        }
        state.expires_at = None;
    }

    /// Idle liveness check: invalidate the session once its lease has run out.
    /// Returns true if a session was dropped.
    pub async fn poll(&self) -> bool {
        let mut state = self.state.lock().await;
        match (&state.handle, state.expires_at) {
            (Some(_), Some(expires_at)) if self.clock.now_millis() >= expires_at => {
                state.handle = None;
                state.expires_at = None;
                debug!("Repository session for '{}' expired", self.locator);
                true
            }
            _ => false,
        }
    }

    pub async fn is_live(&self) -> bool {
        self.state.lock().await.handle.is_some()
    }

    pub async fn expires_at(&self) -> Option<i64> {
        self.state.lock().await.expires_at
    }
}
