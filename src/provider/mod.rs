//! Provider Gateway
//!
//! Generation providers are HTTP text-generation endpoints. Every configured
//! credential becomes one [`ProviderHandle`] in a [`CredentialRing`]; the
//! [`ProviderGateway`] walks the ring with a bounded attempt loop and turns
//! raw provider text into structured documents.

mod error;
mod gateway;
mod ollama;
mod openai;
mod rotation;

pub use error::{GenerationError, ProviderError};
pub use gateway::{MasterGeneration, MasterOptions, ProviderGateway, TranslationGeneration};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use rotation::{CredentialRing, ProviderHandle};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{ProviderConfig, ProviderKind};
use crate::models::TokenCounts;

/// One text-generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    /// Ask for a web-search-capable model when the provider has one
    pub web_search: bool,
}

/// Raw provider response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
    pub text: String,
    pub tokens: TokenCounts,
    /// Model that actually served the request
    pub model: String,
}

/// Text-generation capability
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name used in logs and metrics
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, ProviderError>;
}

/// Build one provider per credential, in configuration order
pub fn build_handles(configs: &[ProviderConfig]) -> Result<Vec<ProviderHandle>, ProviderError> {
    let mut handles = Vec::new();

    for config in configs {
        match config.kind {
            ProviderKind::OpenAi => {
                for (index, key) in config.resolved_keys().into_iter().enumerate() {
                    let provider = OpenAiProvider::from_config(config, key)?;
                    handles.push(ProviderHandle::new(
                        format!("{}#{}", config.name, index),
                        Arc::new(provider),
                        config.requests_per_minute,
                        config.timeout(),
                    ));
                }
            }
            ProviderKind::Ollama => {
                let keys = config.resolved_keys();
                let keys: Vec<Option<String>> = if keys.is_empty() {
                    vec![None]
                } else {
                    keys.into_iter().map(Some).collect()
                };
                for (index, key) in keys.into_iter().enumerate() {
                    let provider = OllamaProvider::from_config(config, key)?;
                    handles.push(ProviderHandle::new(
                        format!("{}#{}", config.name, index),
                        Arc::new(provider),
                        config.requests_per_minute,
                        config.timeout(),
                    ));
                }
            }
        }
    }

    if handles.is_empty() {
        return Err(ProviderError::NoProviders);
    }
    Ok(handles)
}
