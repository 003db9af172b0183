//! Publication hooks
//!
//! Consumers of "an article was published" (feeds, sitemaps, search-engine
//! pings) sit behind [`PublicationHook`]. Hooks run after the article's
//! transaction has committed and never influence the run outcome: the
//! orchestrator spawns them fire-and-forget and failures are only logged.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::ArticleRecord;

/// Errors a hook can report
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid hook configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("hook endpoint answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Receives committed articles
#[async_trait]
pub trait PublicationHook: Send + Sync {
    fn name(&self) -> &str;

    async fn article_published(&self, article: &ArticleRecord) -> Result<(), PublishError>;
}

/// Run `hook` for `article` in the background
pub fn spawn_notify(hook: Arc<dyn PublicationHook>, article: ArticleRecord) {
    tokio::spawn(async move {
        match hook.article_published(&article).await {
            Ok(()) => debug!(hook = hook.name(), slug = %article.slug, "Publication hook delivered"),
            Err(e) => warn!(
                hook = hook.name(),
                slug = %article.slug,
                language = %article.language_code,
                error = %e,
                "Publication hook failed"
            ),
        }
    });
}

// ============================================================================
// Webhook
// ============================================================================

/// JSON body POSTed for each committed article
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublishedPayload<'a> {
    pub event: &'static str,
    pub id: i64,
    pub slug: &'a str,
    pub language: &'a str,
    pub title: &'a str,
    pub canonical_url: &'a str,
    pub master_slug: Option<&'a str>,
    pub published_at: String,
}

impl<'a> PublishedPayload<'a> {
    pub fn from_record(article: &'a ArticleRecord) -> Self {
        Self {
            event: "article.published",
            id: article.id,
            slug: &article.slug,
            language: &article.language_code,
            title: &article.title,
            canonical_url: &article.canonical_url,
            master_slug: article.master_slug.as_deref(),
            published_at: article.published_at.to_rfc3339(),
        }
    }
}

/// POSTs [`PublishedPayload`] to a fixed URL; no retries
pub struct WebhookHook {
    url: String,
    client: Client,
}

impl WebhookHook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PublishError::InvalidConfig(format!(
                "webhook URL must start with http:// or https://, got '{url}'"
            )));
        }
        if timeout.is_zero() {
            return Err(PublishError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PublicationHook for WebhookHook {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn article_published(&self, article: &ArticleRecord) -> Result<(), PublishError> {
        let payload = PublishedPayload::from_record(article);
        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        Err(PublishError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewArticle, TokenCounts};
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> ArticleRecord {
        ArticleRecord::from_new(
            7,
            NewArticle {
                slug: "ten-habits-es".into(),
                title: "Diez hábitos".into(),
                content: "# Diez hábitos".into(),
                summary: "Resumen".into(),
                language_code: "es".into(),
                category_id: 1,
                content_hash: "abc".into(),
                meta_title: "Diez hábitos".into(),
                meta_description: "Meta".into(),
                canonical_url: "https://example.org/es/ten-habits-es".into(),
                reading_time_minutes: 1,
                ai_model: "m".into(),
                ai_prompt: "p".into(),
                tokens: TokenCounts::new(1, 2),
                master_slug: Some("ten-habits".into()),
                source_url: None,
                published_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(WebhookHook::new("example.org/hook", Duration::from_secs(5)).is_err());
        assert!(WebhookHook::new("https://example.org/hook", Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "event": "article.published",
                "slug": "ten-habits-es",
                "language": "es",
                "master_slug": "ten-habits",
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let hook = WebhookHook::new(format!("{}/hook", server.uri()), Duration::from_secs(5)).unwrap();
        hook.article_published(&record()).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let hook = WebhookHook::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = hook.article_published(&record()).await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected { status: 500, .. }));
    }
}
