//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{Error, GenerationError, StoreError};

/// Request fields echoed back so a caller can retry deliberately
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ErrorContext {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    /// Stable machine-readable kind
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "ErrorContext::is_empty")]
    pub context: ErrorContext,
}

/// Error returned by handlers
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    context: ErrorContext,
}

impl ApiError {
    pub fn new(error: Error) -> Self {
        Self {
            error,
            context: ErrorContext::default(),
        }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn status(&self) -> StatusCode {
        status_for(&self.error)
    }

    pub fn error(&self) -> &Error {
        &self.error
    }
}

/// HTTP status for an error
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Generation(GenerationError::InvalidChunkCount { .. }) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Generation(GenerationError::Prompt { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Generation(_) | Error::Provider(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
        Error::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self::new(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.error.kind(), error = %self.error, "Request failed");
        } else {
            tracing::debug!(kind = self.error.kind(), error = %self.error, "Request rejected");
        }

        let body = ErrorBody {
            success: false,
            error: self.error.kind(),
            message: self.error.to_string(),
            context: self.context,
        };
        (status, Json(body)).into_response()
    }
}
