/// Crate-wide error model (A3).
///
/// Each layer converts into `AppError` via `?`/`From` at the HTTP and broker
/// edges; `EventError` is the narrower terminus the event handler uses to
/// decide ack vs nack-with-requeue vs nack-without-requeue.
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(_) => "STORE_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: &'static str,
    request_id: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Store(_) | Self::Cache(_) | Self::Gateway(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        let status = self.status_code();
        // 5xx responses omit internals from the client-visible message in production.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), request_id, "request failed");
            "internal server error".to_string()
        } else {
            tracing::warn!(error = %self, code = self.code(), request_id, "request rejected");
            self.to_string()
        };
        HttpResponse::build(status).json(ErrorBody {
            success: false,
            error: message,
            code: self.code(),
            request_id,
        })
    }
}

/// Distinguishes retryable from terminal failures for the broker-ack decision (C7).
#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("terminal failure: {0}")]
    Terminal(String),
}

impl EventError {
    /// true => nack-with-requeue; false => nack-without-requeue (DLQ).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<AppError> for EventError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Store(_) | AppError::Gateway(_) => EventError::Transient(e.to_string()),
            AppError::Validation(_) => EventError::Malformed(e.to_string()),
            other => EventError::Terminal(other.to_string()),
        }
    }
}
