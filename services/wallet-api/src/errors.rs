use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use wallet_ledger::ErrorKind;

pub const MISSING_TOKEN: &str = "Unauthorized: Missing or malformed token";
pub const INVALID_TOKEN: &str = "Invalid or expired token";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation(msg) => serde_json::json!({
                "error": "VALIDATION_ERROR",
                "message": msg
            }),
            ApiError::InsufficientFunds(msg) => serde_json::json!({
                "error": "INSUFFICIENT_FUNDS",
                "message": msg
            }),
            ApiError::NotFound(msg) => serde_json::json!({
                "error": "NOT_FOUND",
                "message": msg
            }),
            ApiError::Unauthorized(msg) => serde_json::json!({
                "error": msg
            }),
            // Details stay in the logs
            ApiError::Internal(_) => serde_json::json!({
                "error": "INTERNAL_ERROR",
                "message": "try again later"
            }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<wallet_ledger::Error> for ApiError {
    fn from(err: wallet_ledger::Error) -> Self {
        match err.kind() {
            ErrorKind::Validation => ApiError::Validation(err.to_string()),
            ErrorKind::InsufficientFunds => ApiError::InsufficientFunds(err.to_string()),
            ErrorKind::NotFound => ApiError::NotFound(err.to_string()),
            ErrorKind::Infrastructure => {
                tracing::error!(error = %err, "Ledger failure");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<prometheus::Error> for ApiError {
    fn from(err: prometheus::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
