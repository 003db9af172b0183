//! Ollama chat client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationOutput, GenerationProvider, GenerationRequest, ProviderError};
use crate::config::ProviderConfig;
use crate::models::TokenCounts;

/// Ollama chat request
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama chat response
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

/// Client for a local or proxied Ollama server
pub struct OllamaProvider {
    client: Client,
    name: String,
    endpoint: String,
    model: String,
    search_model: Option<String>,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

impl OllamaProvider {
    pub fn from_config(config: &ProviderConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout())
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
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, ProviderError> {
        let url = format!("{}/api/chat", self.endpoint);
        let model = match (&self.search_model, request.web_search) {
            (Some(search), true) => search.as_str(),
            _ => self.model.as_str(),
        };

        let body = OllamaRequest {
            model,
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: &request.system,
                },
                OllamaMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        debug!(provider = %self.name, model = model, "Sending Ollama chat request");

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(&self.name, status, text));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e, self.timeout_secs))?;

        let text = parsed
            .message
            .map(|m| m.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: self.name.clone(),
            })?;

        Ok(GenerationOutput {
            text,
            tokens: TokenCounts::new(parsed.prompt_eval_count, parsed.eval_count),
            model: parsed.model.unwrap_or_else(|| model.to_string()),
        })
    }
}
