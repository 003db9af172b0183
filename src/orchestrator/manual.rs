//! Operator-triggered single-article operations
//!
//! These bypass the timing gate and the daily quota but keep the idempotency
//! guarantees of the persistence layer.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tracing::{info, instrument};

use super::{translation_provenance, Orchestrator};
use crate::config::is_language_code;
use crate::document::ArticleDocument;
use crate::error::{Error, Result};
use crate::models::{ArticleRecord, Category, TokenCounts};
use crate::provider::MasterOptions;
use crate::storage::{InsertOutcome, Provenance, QuotaGuard};
use crate::translation::ChunkCount;
use crate::utils::translation_slug;

/// Result of a manual master generation
#[derive(Debug, Clone, Serialize)]
pub struct ManualGeneration {
    pub category: String,
    /// `inserted` or `duplicate`
    pub outcome: &'static str,
    pub article: ArticleRecord,
    pub provider_used: String,
    pub attempts: u32,
    pub tokens: TokenCounts,
}

/// Result of a manual translation
#[derive(Debug, Clone, Serialize)]
pub struct ManualTranslation {
    pub master_slug: String,
    pub language: String,
    pub chunk_count: u8,
    pub chunks_used: usize,
    pub used_fallback: bool,
    pub attempts: u32,
    pub article: ArticleRecord,
}

impl Orchestrator {
    /// Generate and persist one master article outside the daily plan
    ///
    /// Without a category slug the category with the largest remaining
    /// deficit is used, falling back to the first category.
    pub fn manual_generate<'a>(
        &'a self,
        category_slug: Option<&'a str>,
        web_search: Option<bool>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<ManualGeneration>> {
        self.generate_single(category_slug, web_search, now).boxed()
    }

    /// Translate an existing master article into one language
    ///
    /// Checks run in order: chunk count, language, master existence, existing
    /// translation. All of them happen before any provider call.
    pub fn manual_translate<'a>(
        &'a self,
        slug: &'a str,
        language: &'a str,
        max_chunks: Option<i64>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<ManualTranslation>> {
        self.translate_single(slug, language, max_chunks, now).boxed()
    }

    #[instrument(skip(self, now))]
    async fn generate_single(
        &self,
        category_slug: Option<&str>,
        web_search: Option<bool>,
        now: DateTime<Utc>,
    ) -> Result<ManualGeneration> {
        let day = self.day_for(now);
        let category = self.resolve_category(category_slug, now).await?;
        let options = MasterOptions {
            prefer_web_search: web_search.unwrap_or(self.settings.web_search),
        };

        let generated = self.gateway.generate_master(&category, options).await?;
        let provenance = Provenance {
            model: generated.model.clone(),
            prompt: generated.prompt.clone(),
            tokens: generated.tokens,
        };
        let outcome = self
            .persister
            .persist_master(&generated.doc, &category, &provenance, day, QuotaGuard::none())
            .await?;

        let label = outcome.as_str();
        let article = match outcome {
            InsertOutcome::Inserted(article) => {
                self.notify(&article);
                article
            }
            InsertOutcome::Duplicate(article) => article,
            InsertOutcome::QuotaMet => {
                return Err(Error::other("quota guard rejected an unguarded insert"));
            }
        };

        info!(category = %category.slug, slug = %article.slug, outcome = label, "Manual generation done");
        Ok(ManualGeneration {
            category: category.slug,
            outcome: label,
            article,
            provider_used: generated.provider_used,
            attempts: generated.attempts,
            tokens: generated.tokens,
        })
    }

    #[instrument(skip(self, now))]
    async fn translate_single(
        &self,
        slug: &str,
        language: &str,
        max_chunks: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ManualTranslation> {
        let chunk_count = match max_chunks {
            Some(value) => ChunkCount::new(value)?,
            None => self.settings.default_chunk_count,
        };

        let language = language.trim().to_ascii_lowercase();
        if !is_language_code(&language) {
            return Err(Error::validation(format!(
                "'{language}' is not a valid language code"
            )));
        }
        if language == self.settings.source_language {
            return Err(Error::validation(format!(
                "'{language}' is the source language"
            )));
        }

        let source = &self.settings.source_language;
        let master = self
            .store
            .find_article(source, slug)
            .await?
            .filter(ArticleRecord::is_master)
            .ok_or_else(|| Error::NotFound(format!("master article '{slug}' in '{source}'")))?;

        let target_slug = translation_slug(&master.slug, &language);
        if self.store.article_exists(&language, &target_slug).await? {
            return Err(Error::Conflict(format!(
                "translation '{target_slug}' already exists in '{language}'"
            )));
        }

        let doc = ArticleDocument::parse(&master.content)?;
        let translated = self
            .gateway
            .generate_translation(&language, &doc, chunk_count)
            .await?;

        let provenance = Provenance {
            model: translated.model.clone(),
            prompt: translation_provenance(source, &language, translated.chunks),
            tokens: translated.tokens,
        };
        let day = self.day_for(now);
        let outcome = self
            .persister
            .persist_translation(&translated.doc, &master, &language, &provenance, day)
            .await?;

        let article = match outcome {
            InsertOutcome::Inserted(article) => article,
            InsertOutcome::Duplicate(_) | InsertOutcome::QuotaMet => {
                return Err(Error::Conflict(format!(
                    "translation '{target_slug}' was written concurrently"
                )));
            }
        };
        self.notify(&article);

        Ok(ManualTranslation {
            master_slug: master.slug,
            language,
            chunk_count: chunk_count.get() as u8,
            chunks_used: translated.chunks,
            used_fallback: translated.used_fallback,
            attempts: translated.attempts,
            article,
        })
    }

    async fn resolve_category(
        &self,
        category_slug: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Category> {
        if let Some(slug) = category_slug {
            return self
                .store
                .category_by_slug(slug)
                .await?
                .ok_or_else(|| Error::NotFound(format!("category '{slug}'")));
        }

        let plan = self
            .planner
            .plan(self.day_for(now), self.settings.daily_target)
            .await?;
        if let Some(unit) = plan.units.into_iter().next() {
            return Ok(unit.category);
        }

        self.store
            .list_categories()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(String::from("no categories configured")))
    }
}
