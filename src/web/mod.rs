//! HTTP surface over the lookup and auth services.
//!
//! Handlers return `web::Result<T>`; every `SyncError` that escapes a
//! handler becomes a JSON body of the form `{"error": .., "code": ..}`.

pub mod routes;

use crate::core::SyncError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

pub use routes::{AppState, build_router};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Sync(SyncError),
    Input(String),
}

impl From<SyncError> for WebError {
    fn from(err: SyncError) -> Self {
        WebError::Sync(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Sync(SyncError::RecordNotFound { kind, key }) => (
                StatusCode::NOT_FOUND,
                format!("{} '{}' not found", kind, key),
                "not_found",
            ),
            WebError::Sync(err @ (SyncError::PoolExhausted(_) | SyncError::StorageBusy(_))) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string(), "busy")
            }
            WebError::Sync(err) => {
                error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    err.to_string(),
                    "internal_error",
                )
            }
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "input_error"),
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
