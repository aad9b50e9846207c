//! Error types shared across the RAG platform services.
//!
//! Unlike a typical internal API, the public contract here is a flat
//! `{ "detail": string }` body (see spec §7) rather than a nested error
//! envelope — this matches the original FastAPI services being replaced.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error taxonomy (spec §7 / §9's tagged-variant design note).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("{message}")]
    TooLarge { message: String },

    #[error("{message}")]
    UnprocessableEntity { message: String },

    #[error("{detail}")]
    Upstream { status: StatusCode, detail: String },

    /// Clear-collection's structured 207 body (spec §6 `DELETE /documents`).
    #[error("partial success")]
    PartialSuccess(serde_json::Value),

    #[error("{message}")]
    Internal { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict { message: message.into() }
    }

    pub fn too_large(message: impl Into<String>) -> Self {
        AppError::TooLarge { message: message.into() }
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        AppError::UnprocessableEntity { message: message.into() }
    }

    pub fn upstream(status: StatusCode, detail: impl Into<String>) -> Self {
        AppError::Upstream { status, detail: detail.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Upstream { status, .. } => *status,
            AppError::PartialSuccess(_) => StatusCode::MULTI_STATUS,
            AppError::Internal { .. } | AppError::Configuration { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

#[derive(Debug, Serialize)]
struct DetailBody {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "server error");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "client error");
        }

        if let AppError::PartialSuccess(body) = self {
            return (status, Json(body)).into_response();
        }

        let detail = self.to_string();
        (status, Json(DetailBody { detail })).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal { message: err.to_string() }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: err.to_string(),
        }
    }
}
