//! Error handling for the shelf HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Message returned for every failure the handlers did not anticipate.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred.";

/// Standard error response format for all HTTP errors
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
    pub details: serde_json::Value,
}

/// Application error types that map to HTTP responses
#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation error: {message}")]
    Validation {
        details: Vec<serde_json::Value>,
        message: String,
    },

    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Create a validation error
    pub fn validation(details: Vec<serde_json::Value>, message: impl Into<String>) -> Self {
        Self::Validation {
            details,
            message: message.into(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Uniform 500 response for unhandled failures, including caught panics.
pub fn unexpected_error_response(details: impl Into<String>) -> Response {
    let body = ErrorBody {
        status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        message: UNEXPECTED_ERROR_MESSAGE.to_string(),
        details: serde_json::Value::String(details.into()),
    };

    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4();
        let status = self.status();

        let (message, details) = match self {
            AppError::Validation { details, message } => {
                (message, serde_json::Value::Array(details))
            }
            AppError::BadRequest { message }
            | AppError::NotFound { message }
            | AppError::Conflict { message } => (message, serde_json::Value::Null),
            AppError::Internal(e) => {
                tracing::error!(
                    error_id = %error_id,
                    error = ?e,
                    "An error occurred: {}",
                    e
                );
                return unexpected_error_response(e.to_string());
            }
        };

        tracing::warn!(
            error_id = %error_id,
            status_code = %status.as_u16(),
            %message,
            "request rejected"
        );

        let body = ErrorBody {
            status_code: status.as_u16(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}
