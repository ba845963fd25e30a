use crate::domain::connector::ConnectorError;
use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use std::time::Duration;

/// Application error types.
#[derive(Debug)]
pub enum AppError {
    /// Bad request with message
    BadRequest(String),
    /// Unauthorized access
    Unauthorized(String),
    /// Resource not found
    NotFound(String),
    /// Internal server error
    Internal(String),
    /// External service error
    ExternalService(String),
    /// Repository temporarily unavailable; retry later
    Unavailable { message: String, retry_after: Duration },
    /// Operation cancelled before it completed
    Cancelled(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal Error: {}", msg),
            AppError::ExternalService(msg) => write!(f, "External Service Error: {}", msg),
            AppError::Unavailable { message, .. } => write!(f, "Service Unavailable: {}", message),
            AppError::Cancelled(msg) => write!(f, "Cancelled: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Cancelled(_) => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_type = match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal_error",
            AppError::ExternalService(_) => "external_service_error",
            AppError::Unavailable { .. } => "service_unavailable",
            AppError::Cancelled(_) => "cancelled",
        };

        let mut builder = HttpResponse::build(self.status_code());
        if let AppError::Unavailable { retry_after, .. } = self {
            builder.insert_header((header::RETRY_AFTER, retry_after.as_secs().to_string()));
        }
        builder.json(serde_json::json!({
            "error": error_type,
            "message": self.to_string()
        }))
    }
}

impl From<ConnectorError> for AppError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Configuration(_) => AppError::BadRequest(err.to_string()),
            ConnectorError::Transient { message, retry_after } => AppError::Unavailable {
                message,
                retry_after,
            },
            ConnectorError::Cancelled => AppError::Cancelled(err.to_string()),
            ConnectorError::Repository(_) | ConnectorError::Document { .. } => {
                AppError::ExternalService(err.to_string())
            }
            ConnectorError::Sink(_) => AppError::Internal(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
