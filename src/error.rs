//! Unified error handling for the dailyquill crate
//!
//! Each domain keeps its own error enum; this module folds them into a single
//! [`Error`] so orchestration and the HTTP layer can classify failures without
//! string matching.
//!
//! # Architecture
//!
//! - [`QuillError`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use dailyquill::error::{Error, QuillError};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retry later: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::document::DocumentError;
pub use crate::provider::{GenerationError, ProviderError};
pub use crate::scheduler::SchedulerError;
pub use crate::storage::StoreError;

/// Common trait for all dailyquill error types
pub trait QuillError: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad input, never retried
    Validation,
    /// Generation provider failures (timeouts, rate limits, exhaustion)
    Provider,
    /// Provider output that could not be mapped to a document
    Parsing,
    /// Content store and I/O errors
    Storage,
    /// Configuration errors
    Config,
    /// Scheduler and timing errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Provider => "provider",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the dailyquill crate
#[derive(Error, Debug)]
pub enum Error {
    /// Generation and translation failures
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// A single provider call failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Content store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Document structure errors
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Scheduler and timing errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Prompt template errors
    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl QuillError for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_recoverable(),
            Self::Provider(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Document(_) => true, // a fresh generation may parse
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Validation(_) | Self::NotFound(_) | Self::Conflict(_) => false,
            Self::Template(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Generation(e) => e.category(),
            Self::Provider(_) | Self::Http(_) => ErrorCategory::Provider,
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Document(_) | Self::Json(_) => ErrorCategory::Parsing,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Validation(_) | Self::NotFound(_) | Self::Conflict(_) => {
                ErrorCategory::Validation
            }
            Self::Template(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Stable machine-readable kind used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation(e) => e.kind(),
            Self::Provider(_) => "provider_error",
            Self::Store(StoreError::Unavailable(_)) => "store_unavailable",
            Self::Store(_) => "store_error",
            Self::Document(_) => "parse_failure",
            Self::Scheduler(_) => "scheduler_error",
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Template(_) => "template_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
            Self::Other { .. } => "internal_error",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::Generation(GenerationError::InvalidChunkCount { value: 15 });
        assert_eq!(err.category(), ErrorCategory::Validation);

        let err = Error::Store(StoreError::Unavailable("connection refused".into()));
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_is_recoverable() {
        let err = Error::Store(StoreError::Unavailable("down".into()));
        assert!(err.is_recoverable());

        let err = Error::validation("bad language");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_kind() {
        assert_eq!(Error::NotFound("slug".into()).kind(), "not_found");
        assert_eq!(Error::Conflict("slug".into()).kind(), "conflict");
        assert_eq!(
            Error::Generation(GenerationError::InvalidChunkCount { value: -1 }).kind(),
            "invalid_chunk_count"
        );
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("no providers configured");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.kind(), "internal_error");
    }
}
