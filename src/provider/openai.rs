//! OpenAI-compatible chat completions client
//!
//! Covers OpenAI, OpenRouter and other endpoints that speak the
//! `/chat/completions` protocol. Web search is served by switching to the
//! configured search model.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationOutput, GenerationProvider, GenerationRequest, ProviderError};
use crate::config::ProviderConfig;
use crate::models::TokenCounts;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Client bound to one API key
pub struct OpenAiProvider {
    client: Client,
    name: String,
    endpoint: String,
    model: String,
    search_model: Option<String>,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn from_config(config: &ProviderConfig, api_key: String) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::Setup {
                provider: config.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            name: config.name.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            search_model: config.search_model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    fn model_for(&self, request: &GenerationRequest) -> &str {
        match (&self.search_model, request.web_search) {
            (Some(search), true) => search,
            _ => &self.model,
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let model = self.model_for(request);

        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(provider = %self.name, model = model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(&self.name, status, text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e, self.timeout_secs))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: self.name.clone(),
            })?;

        let tokens = parsed
            .usage
            .map(|u| TokenCounts::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(GenerationOutput {
            text,
            tokens,
            model: parsed.model.unwrap_or_else(|| model.to_string()),
        })
    }
}
