use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Every way a request can end other than success. Each variant maps to
/// exactly one HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input. 400.
    #[error("{message}")]
    Validation {
        message: String,
        detail: Option<String>,
    },
    /// Duplicate id on create. 409.
    #[error("{message}")]
    Conflict { message: String },
    /// Aggregate or nested element absent. 404.
    #[error("{message}")]
    NotFound {
        message: String,
        detail: Option<String>,
    },
    /// Document store failure other than not-found. 502.
    #[error("{message}: {detail}")]
    Upstream { message: String, detail: String },
    /// Broken invariant inside the service. 500.
    #[error("{message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            detail: None,
        }
    }

    pub fn invalid_body(rejection: JsonRejection) -> Self {
        ApiError::Validation {
            message: "Invalid request body".into(),
            detail: Some(rejection.body_text()),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
            detail: None,
        }
    }

    /// Not-found reported by the store, keeping its message as detail.
    pub fn missing_document(message: impl Into<String>, err: &StoreError) -> Self {
        ApiError::NotFound {
            message: message.into(),
            detail: Some(err.to_string()),
        }
    }

    pub fn upstream(message: impl Into<String>, err: &StoreError) -> Self {
        ApiError::Upstream {
            message: message.into(),
            detail: err.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation { message, .. }
            | ApiError::Conflict { message }
            | ApiError::NotFound { message, .. }
            | ApiError::Upstream { message, .. }
            | ApiError::Internal { message } => message,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Validation { detail, .. } | ApiError::NotFound { detail, .. } => {
                detail.as_deref()
            }
            ApiError::Upstream { detail, .. } => Some(detail),
            ApiError::Conflict { .. } | ApiError::Internal { .. } => None,
        }
    }
}

/// Wire shape of every error response.
#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            status: status.canonical_reason().unwrap_or("Error"),
            message: self.message(),
            error: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}
