//! Error taxonomy for the storefront API
//!
//! Every failure a handler can report is an [`AppError`]. Each variant maps
//! to one HTTP status and one stable metrics label, and renders as a JSON
//! body of the form `{"error": "<message>"}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::ErrorKind;
use crate::store::StoreError;

/// Message returned to clients for any storage failure.
pub const STORAGE_ERROR_MESSAGE: &str = "internal storage error";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Malformed, missing or inconsistent request data
    #[error("{0}")]
    Validation(String),
    /// Referenced id does not exist
    #[error("{0}")]
    NotFound(String),
    /// Duplicate unique key
    #[error("{0}")]
    Conflict(String),
    /// Credentials did not match
    #[error("{0}")]
    Unauthorized(String),
    /// I/O or transaction failure; the detail is logged, never returned
    #[error("storage failure: {0}")]
    Storage(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(message.into())
    }

    /// Stable label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Storage(_) => "storage_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to a client
    pub fn public_message(&self) -> String {
        match self {
            AppError::Storage(_) => STORAGE_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(message) => AppError::Conflict(message),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// JSON body returned for every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Storage(detail) = &self {
            tracing::error!(error.kind = self.kind(), detail = %detail, "request failed");
        } else {
            tracing::debug!(error.kind = self.kind(), message = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.public_message(),
        };
        let mut response = (self.status_code(), Json(body)).into_response();
        response.extensions_mut().insert(ErrorKind(self.kind()));
        response
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
