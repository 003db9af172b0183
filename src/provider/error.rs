//! Error types for the provider gateway

use thiserror::Error;

use crate::document::Skeleton;
use crate::error::{ErrorCategory, QuillError};

/// Failure of a single provider call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider}: request timed out after {after_secs}s")]
    Timeout { provider: String, after_secs: u64 },

    #[error("{provider}: rate limited")]
    RateLimited { provider: String },

    #[error("{provider}: server error {status}: {body}")]
    Server {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider}: request rejected {status}: {body}")]
    Client {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider}: transport error: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider}: empty response")]
    EmptyResponse { provider: String },

    #[error("{provider}: invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("no providers configured")]
    NoProviders,

    #[error("{provider}: client setup failed: {reason}")]
    Setup { provider: String, reason: String },
}

impl ProviderError {
    /// Map a non-success HTTP status
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: String) -> Self {
        let provider = provider.to_string();
        let body = crate::utils::truncate_text(body.trim(), 300);
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited { provider }
        } else if status.is_server_error() {
            Self::Server {
                provider,
                status: status.as_u16(),
                body,
            }
        } else {
            Self::Client {
                provider,
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Map a reqwest failure
    pub fn from_reqwest(provider: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
                after_secs: timeout_secs,
            }
        } else if err.is_decode() {
            Self::InvalidResponse {
                provider: provider.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Short label used in metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::Server { .. } => "server",
            Self::Client { .. } => "client",
            Self::Transport { .. } => "transport",
            Self::EmptyResponse { .. } => "empty",
            Self::InvalidResponse { .. } => "invalid",
            Self::NoProviders => "no_providers",
            Self::Setup { .. } => "setup",
        }
    }
}

impl QuillError for ProviderError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::NoProviders | Self::Setup { .. })
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NoProviders | Self::Setup { .. } => ErrorCategory::Config,
            Self::InvalidResponse { .. } => ErrorCategory::Parsing,
            _ => ErrorCategory::Provider,
        }
    }
}

/// Failure of a master generation or translation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("all {attempts} provider attempts failed, last error: {last_error}")]
    ProviderExhausted {
        attempts: u32,
        last_error: ProviderError,
    },

    #[error("provider response could not be parsed after {attempts} attempts: {reason}")]
    ParseFailure { attempts: u32, reason: String },

    #[error("chunk count {value} is outside 0-10")]
    InvalidChunkCount { value: i64 },

    #[error("translated structure {actual:?} does not match source {expected:?}")]
    StructuralMismatch {
        expected: Skeleton,
        actual: Option<Skeleton>,
    },

    #[error("prompt rendering failed: {reason}")]
    Prompt { reason: String },
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderExhausted { .. } => "provider_exhausted",
            Self::ParseFailure { .. } => "parse_failure",
            Self::InvalidChunkCount { .. } => "invalid_chunk_count",
            Self::StructuralMismatch { .. } => "structural_mismatch",
            Self::Prompt { .. } => "prompt_error",
        }
    }
}

impl QuillError for GenerationError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ProviderExhausted { .. }
                | Self::ParseFailure { .. }
                | Self::StructuralMismatch { .. }
        )
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ProviderExhausted { .. } => ErrorCategory::Provider,
            Self::ParseFailure { .. } | Self::StructuralMismatch { .. } => ErrorCategory::Parsing,
            Self::InvalidChunkCount { .. } => ErrorCategory::Validation,
            Self::Prompt { .. } => ErrorCategory::Config,
        }
    }
}

impl From<handlebars::RenderError> for GenerationError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Prompt {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ProviderError::from_status("p", StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            ProviderError::from_status("p", StatusCode::BAD_GATEWAY, "upstream".into()),
            ProviderError::Server { status: 502, .. }
        ));
        assert!(matches!(
            ProviderError::from_status("p", StatusCode::UNAUTHORIZED, String::new()),
            ProviderError::Client { status: 401, .. }
        ));
    }

    #[test]
    fn test_generation_error_classification() {
        let exhausted = GenerationError::ProviderExhausted {
            attempts: 3,
            last_error: ProviderError::RateLimited {
                provider: "p".into(),
            },
        };
        assert!(exhausted.is_recoverable());
        assert_eq!(exhausted.category(), ErrorCategory::Provider);

        let invalid = GenerationError::InvalidChunkCount { value: 15 };
        assert!(!invalid.is_recoverable());
        assert_eq!(invalid.category(), ErrorCategory::Validation);
    }
}
