//! Mapping of store failures to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::response::json_error;
use crate::store::StoreError;

/// Errors surfaced by the REST handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ResourceNotFound(_) | StoreError::RecordNotFound { .. } => ApiError::NotFound,
            StoreError::NotACollection(_)
            | StoreError::NotSingular(_)
            | StoreError::NotAnObject
            | StoreError::InvalidQuery { .. } => ApiError::BadRequest(err.to_string()),
            StoreError::DuplicateId(_) => ApiError::Conflict(err.to_string()),
            StoreError::InvalidDocument | StoreError::Io(_) | StoreError::Json(_) => {
                tracing::error!(error = %err, "Store failure");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            // Unknown resources and ids answer with an empty object.
            ApiError::NotFound => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, &msg),
            ApiError::Conflict(msg) => json_error(StatusCode::CONFLICT, &msg),
            ApiError::Internal(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &msg),
        }
    }
}
