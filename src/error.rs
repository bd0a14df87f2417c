//! Typed error kinds shared by the ACK composer and the admin HTTP surface.
//!
//! Every handler returns one of these kinds instead of reaching for
//! exceptions or ad hoc status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("malformed packet")]
    Malformed,
    #[error("authentication failed")]
    Auth,
    #[error("rate limited")]
    RateLimited,
    #[error("unknown event")]
    UnknownEvent,
    #[error("event archived")]
    ArchivedEvent,
    #[error("disk error")]
    Io,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("assist disabled")]
    AssistDisabled,
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{kind}: {message}")]
    Kind { kind: ErrorKind, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Kind { kind, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Kind { kind, .. } => match kind {
                ErrorKind::Malformed => StatusCode::BAD_REQUEST,
                ErrorKind::Auth => StatusCode::UNAUTHORIZED,
                ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ErrorKind::UnknownEvent => StatusCode::NOT_FOUND,
                ErrorKind::ArchivedEvent => StatusCode::FORBIDDEN,
                ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                ErrorKind::AssistDisabled => StatusCode::OK,
            },
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
        };

        let (error, message) = match &self {
            AppError::Kind { kind, message } => (serde_json::to_string(kind).unwrap_or_default().trim_matches('"').to_string(), message.clone()),
            other => ("internal".to_string(), other.to_string()),
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}
