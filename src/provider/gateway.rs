//! Master generation and translation over the credential ring

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{CredentialRing, GenerationError, GenerationRequest, ProviderError};
use crate::document::{ArticleDocument, DocumentError};
use crate::metrics;
use crate::models::{Category, TokenCounts};
use crate::prompts::PromptCatalog;
use crate::translation::{
    ChunkCount, ChunkOutput, ChunkRequest, ChunkTranslator, TranslationEngine,
};
use crate::utils::retry::{retry_bounded, Attempt, RetryConfig, RetryOutcome};

/// Options for one master generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasterOptions {
    pub prefer_web_search: bool,
}

/// Successful master generation
#[derive(Debug, Clone)]
pub struct MasterGeneration {
    pub doc: ArticleDocument,
    pub tokens: TokenCounts,
    /// Handle label that produced the document
    pub provider_used: String,
    pub model: String,
    /// User prompt sent for the successful attempt
    pub prompt: String,
    pub attempts: u32,
}

/// Successful translation of one document into one language
#[derive(Debug, Clone)]
pub struct TranslationGeneration {
    pub doc: ArticleDocument,
    pub tokens: TokenCounts,
    pub attempts: u32,
    pub chunks: usize,
    pub used_fallback: bool,
    pub model: String,
}

/// Why one attempt failed
#[derive(Debug)]
enum AttemptError {
    Provider(ProviderError),
    Parse(DocumentError),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider(e) => write!(f, "{e}"),
            Self::Parse(e) => write!(f, "unparseable response: {e}"),
        }
    }
}

/// Successful provider call
struct Served<T> {
    value: T,
    tokens: TokenCounts,
    label: String,
    model: String,
}

/// Provider Gateway
pub struct ProviderGateway {
    ring: Arc<CredentialRing>,
    retry: RetryConfig,
    prompts: Arc<PromptCatalog>,
    engine: TranslationEngine,
}

impl ProviderGateway {
    pub fn new(
        ring: Arc<CredentialRing>,
        retry: RetryConfig,
        prompts: Arc<PromptCatalog>,
        engine: TranslationEngine,
    ) -> Self {
        Self {
            ring,
            retry,
            prompts,
            engine,
        }
    }

    pub fn ring(&self) -> &CredentialRing {
        &self.ring
    }

    /// Generate and parse one master article for `category`
    #[instrument(skip_all, fields(category = %category.slug, web_search = options.prefer_web_search))]
    pub async fn generate_master(
        &self,
        category: &Category,
        options: MasterOptions,
    ) -> Result<MasterGeneration, GenerationError> {
        let prompt = self.prompts.prompt_for(category, options.prefer_web_search)?;
        let request = GenerationRequest {
            system: prompt.system,
            user: prompt.user,
            web_search: options.prefer_web_search,
        };

        let (served, attempts) = self
            .call_with_rotation(&request, "master", |text| ArticleDocument::parse(text))
            .await?;

        info!(
            provider = %served.label,
            model = %served.model,
            attempts = attempts,
            title = %served.value.title,
            "Master article generated"
        );

        Ok(MasterGeneration {
            doc: served.value,
            tokens: served.tokens,
            provider_used: served.label,
            model: served.model,
            prompt: request.user,
            attempts,
        })
    }

    /// Translate `doc` into `language` using `chunk_count` chunks
    #[instrument(skip_all, fields(language = %language, chunk_count = %chunk_count))]
    pub async fn generate_translation(
        &self,
        language: &str,
        doc: &ArticleDocument,
        chunk_count: ChunkCount,
    ) -> Result<TranslationGeneration, GenerationError> {
        let translator = LanguageTranslator {
            gateway: self,
            language,
        };

        let translated = self.engine.translate(doc, chunk_count, &translator).await?;

        Ok(TranslationGeneration {
            doc: translated.doc,
            tokens: translated.tokens,
            attempts: translated.attempts,
            chunks: translated.chunks,
            used_fallback: translated.used_fallback,
            model: translated.model,
        })
    }

    /// Walk the ring until a response is served and accepted by `accept`
    async fn call_with_rotation<T, F>(
        &self,
        request: &GenerationRequest,
        operation: &'static str,
        accept: F,
    ) -> Result<(Served<T>, u32), GenerationError>
    where
        F: Fn(&str) -> Result<T, DocumentError>,
    {
        let accept = &accept;
        let outcome = retry_bounded(&self.retry, |attempt| {
            let handle = self.ring.next();
            async move {
                metrics::record_provider_attempt(handle.provider_name(), operation);

                let result = match handle.call(request).await {
                    Ok(output) => match accept(&output.text) {
                        Ok(value) => Attempt::Success(Served {
                            value,
                            tokens: output.tokens,
                            label: handle.label().to_string(),
                            model: output.model,
                        }),
                        Err(e) => Attempt::TransientFailure(AttemptError::Parse(e)),
                    },
                    Err(e) => {
                        metrics::record_provider_failure(handle.provider_name(), e.label());
                        Attempt::TransientFailure(AttemptError::Provider(e))
                    }
                };

                if let Attempt::TransientFailure(e) = &result {
                    warn!(
                        provider = %handle.label(),
                        attempt = attempt + 1,
                        operation = operation,
                        error = %e,
                        "Provider attempt failed, rotating"
                    );
                }
                result
            }
        })
        .await;

        match outcome {
            RetryOutcome::Success { value, attempts } => Ok((value, attempts)),
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                metrics::record_provider_exhausted(operation);
                Err(match last_error {
                    AttemptError::Provider(e) => GenerationError::ProviderExhausted {
                        attempts,
                        last_error: e,
                    },
                    AttemptError::Parse(e) => GenerationError::ParseFailure {
                        attempts,
                        reason: e.to_string(),
                    },
                })
            }
        }
    }
}

/// Chunk translator bound to one target language
struct LanguageTranslator<'a> {
    gateway: &'a ProviderGateway,
    language: &'a str,
}

#[async_trait]
impl ChunkTranslator for LanguageTranslator<'_> {
    async fn translate_chunk(&self, chunk: ChunkRequest<'_>) -> Result<ChunkOutput, GenerationError> {
        let prompt = self.gateway.prompts.translation_prompt(
            self.language,
            chunk.text,
            chunk.index,
            chunk.total,
        )?;
        let request = GenerationRequest {
            system: prompt.system,
            user: prompt.user,
            web_search: false,
        };

        let (served, attempts) = self
            .gateway
            .call_with_rotation(&request, "translation", |text| {
                Ok(crate::document::strip_code_fences(text).to_string())
            })
            .await?;

        Ok(ChunkOutput {
            text: served.value,
            tokens: served.tokens,
            attempts,
            model: served.model,
        })
    }
}
