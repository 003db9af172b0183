//! Turns generated documents into article rows and writes them idempotently

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use super::{InsertOutcome, QuotaGuard, SharedContentStore, StoreError};
use crate::document::ArticleDocument;
use crate::metrics;
use crate::models::{ArticleRecord, Category, NewArticle, TokenCounts};
use crate::utils::{
    content_hash, normalize_whitespace, reading_time_minutes, slugify, translation_slug,
    truncate_text,
};

/// Search engines truncate titles around this length
const META_TITLE_MAX: usize = 60;

/// Summary used when the document has none
const FALLBACK_SUMMARY_MAX: usize = 300;

/// Where a document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub model: String,
    pub prompt: String,
    pub tokens: TokenCounts,
}

/// Builds [`NewArticle`] rows and writes them through the store
#[derive(Clone)]
pub struct ArticlePersister {
    store: SharedContentStore,
    base_url: String,
    source_language: String,
}

impl ArticlePersister {
    pub fn new(
        store: SharedContentStore,
        base_url: impl Into<String>,
        source_language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            source_language: source_language.into(),
        }
    }

    pub fn store(&self) -> &SharedContentStore {
        &self.store
    }

    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    /// Canonical link for an article
    pub fn canonical_url(&self, language: &str, slug: &str) -> String {
        format!("{}/{}/{}", self.base_url, language, slug)
    }

    /// Row for a master article in the source language
    pub fn build_master(
        &self,
        doc: &ArticleDocument,
        category: &Category,
        provenance: &Provenance,
        published_at: DateTime<Utc>,
    ) -> NewArticle {
        let slug = slugify(&doc.title);
        self.build(doc, slug, &self.source_language, category.id, None, provenance, published_at)
    }

    /// Row for a translation of `master`
    pub fn build_translation(
        &self,
        doc: &ArticleDocument,
        master: &ArticleRecord,
        language: &str,
        provenance: &Provenance,
        published_at: DateTime<Utc>,
    ) -> NewArticle {
        let slug = translation_slug(&master.slug, language);
        self.build(
            doc,
            slug,
            language,
            master.category_id,
            Some(master.slug.clone()),
            provenance,
            published_at,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        doc: &ArticleDocument,
        slug: String,
        language: &str,
        category_id: i64,
        master_slug: Option<String>,
        provenance: &Provenance,
        published_at: DateTime<Utc>,
    ) -> NewArticle {
        let content = doc.to_markdown();
        let summary = if doc.summary.trim().is_empty() {
            truncate_text(&normalize_whitespace(&doc.intro), FALLBACK_SUMMARY_MAX)
        } else {
            doc.summary.trim().to_string()
        };

        NewArticle {
            canonical_url: self.canonical_url(language, &slug),
            slug,
            title: doc.title.trim().to_string(),
            summary,
            language_code: language.to_string(),
            category_id,
            content_hash: content_hash(&content),
            meta_title: truncate_text(doc.title.trim(), META_TITLE_MAX),
            meta_description: normalize_whitespace(&doc.meta_description),
            reading_time_minutes: reading_time_minutes(&content),
            ai_model: provenance.model.clone(),
            ai_prompt: provenance.prompt.clone(),
            tokens: provenance.tokens,
            master_slug,
            source_url: None,
            content,
            published_at,
        }
    }

    /// Persist a master article for `day`
    ///
    /// An existing slug short-circuits to `Duplicate` with no ledger change.
    #[instrument(skip_all, fields(category = %category.slug, day = %day))]
    pub async fn persist_master(
        &self,
        doc: &ArticleDocument,
        category: &Category,
        provenance: &Provenance,
        day: NaiveDate,
        guard: QuotaGuard,
    ) -> Result<InsertOutcome, StoreError> {
        let article = self.build_master(doc, category, provenance, Utc::now());
        let slug = article.slug.clone();
        let outcome = self.store.insert_master(article, day, guard).await?;
        self.observe(&outcome, &self.source_language, &slug, "master");
        Ok(outcome)
    }

    /// Persist a translation of `master` into `language` for `day`
    #[instrument(skip_all, fields(master = %master.slug, language = %language, day = %day))]
    pub async fn persist_translation(
        &self,
        doc: &ArticleDocument,
        master: &ArticleRecord,
        language: &str,
        provenance: &Provenance,
        day: NaiveDate,
    ) -> Result<InsertOutcome, StoreError> {
        let article = self.build_translation(doc, master, language, provenance, Utc::now());
        let slug = article.slug.clone();
        let outcome = self.store.insert_translation(article, day).await?;
        self.observe(&outcome, language, &slug, "translation");
        Ok(outcome)
    }

    fn observe(&self, outcome: &InsertOutcome, language: &str, slug: &str, kind: &str) {
        match outcome {
            InsertOutcome::Inserted(record) => {
                metrics::record_article_persisted(
                    language,
                    kind,
                    record.tokens_in,
                    record.tokens_out,
                );
                info!(slug = %slug, id = record.id, kind = kind, "Article committed");
            }
            InsertOutcome::Duplicate(_) => {
                metrics::record_duplicate(language);
                info!(slug = %slug, kind = kind, "Slug already present, skipping insert");
            }
            InsertOutcome::QuotaMet => {
                debug!(slug = %slug, "Daily target already met, skipping insert");
            }
        }
    }
}
