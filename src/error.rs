use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::validation::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed")]
    Validation(ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Maps a failed insert on the votes primary key (or any other unique
    /// constraint) to Conflict, leaving other database errors untouched.
    pub fn from_constraint(err: rusqlite::Error, conflict_msg: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AppError::Conflict(conflict_msg.to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Expected outcomes (404/401/403/409/422/400) are not failures and
        // are never logged; only the 500 family records internal detail.
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            AppError::Validation(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response()
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                server_error()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                server_error()
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                server_error()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                server_error()
            }
        }
    }
}

fn server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

pub type AppResult<T> = Result<T, AppError>;
