//! Content store: categories, language-sharded articles and the daily ledgers
//!
//! Business logic talks to the [`ContentStore`] trait only. Two backends
//! implement it:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │         Orchestrator / Persister / Status reporter          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ContentStore trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                         │
//!                   ▼                         ▼
//!          ┌─────────────────┐       ┌─────────────────┐
//!          │     SQLite      │       │   PostgreSQL    │
//!          └─────────────────┘       └─────────────────┘
//! ```
//!
//! Article inserts are the unit of atomicity: the idempotency check, the row
//! itself, the token ledger and (for master articles) the job counter are
//! written in one transaction.

mod persister;
mod postgres;
mod shard;
mod sqlite;

pub use persister::{ArticlePersister, Provenance};
pub use postgres::PgContentStore;
pub use shard::{all_shards, shard_for, BASE_SHARD};
pub use sqlite::SqliteContentStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{CategorySeed, DatabaseBackend, DatabaseConfig};
use crate::error::{ErrorCategory, QuillError};
use crate::models::{ArticleRecord, Category, GenerationJob, JobStatus, NewArticle, TokenUsage};

// ============================================================================
// Errors
// ============================================================================

/// Content store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database cannot be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A statement failed
    #[error("query failed during {operation}: {message}")]
    Query { operation: String, message: String },

    /// A stored value could not be decoded
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: String, reason: String },
}

impl StoreError {
    pub fn query(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Query {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}

impl QuillError for StoreError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

// ============================================================================
// Insert Results
// ============================================================================

/// Optional per-category ceiling re-checked inside the insert transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaGuard {
    pub per_category_target: Option<u32>,
}

impl QuotaGuard {
    /// No ceiling; used by ad hoc manual generation
    pub fn none() -> Self {
        Self::default()
    }

    pub fn target(per_category_target: u32) -> Self {
        Self {
            per_category_target: Some(per_category_target),
        }
    }
}

/// Result of an idempotent insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// Row written and ledgers updated
    Inserted(ArticleRecord),
    /// Slug already present in the shard; nothing written
    Duplicate(ArticleRecord),
    /// Category already reached its daily target; nothing written
    QuotaMet,
}

impl InsertOutcome {
    pub fn record(&self) -> Option<&ArticleRecord> {
        match self {
            Self::Inserted(record) | Self::Duplicate(record) => Some(record),
            Self::QuotaMet => None,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "inserted",
            Self::Duplicate(_) => "duplicate",
            Self::QuotaMet => "quota_met",
        }
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence seam used by the orchestrator, persister and status reporter
///
/// Dates are always passed explicitly; stores never read the wall clock to
/// decide which day a write belongs to.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Cheap round trip used by health checks
    async fn ping(&self) -> Result<(), StoreError>;

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError>;

    /// Insert a category or update its display name
    async fn upsert_category(&self, slug: &str, display_name: &str)
        -> Result<Category, StoreError>;

    /// Master articles committed on `day`, per category id
    async fn count_generated(
        &self,
        day: NaiveDate,
        source_language: &str,
    ) -> Result<HashMap<i64, u32>, StoreError>;

    async fn job_for(&self, day: NaiveDate) -> Result<Option<GenerationJob>, StoreError>;

    /// Most recently finalized job that committed at least something
    async fn last_successful_job(&self) -> Result<Option<GenerationJob>, StoreError>;

    /// Create the day's job row if missing and record the current target
    async fn ensure_job(&self, day: NaiveDate, target: u32) -> Result<GenerationJob, StoreError>;

    /// Close the day's job with a terminal status
    async fn finalize_job(
        &self,
        day: NaiveDate,
        status: JobStatus,
        error_summary: Option<String>,
        summary: Option<serde_json::Value>,
    ) -> Result<GenerationJob, StoreError>;

    async fn token_usage(&self, day: NaiveDate) -> Result<TokenUsage, StoreError>;

    async fn find_article(
        &self,
        language: &str,
        slug: &str,
    ) -> Result<Option<ArticleRecord>, StoreError>;

    async fn article_exists(&self, language: &str, slug: &str) -> Result<bool, StoreError> {
        Ok(self.find_article(language, slug).await?.is_some())
    }

    /// Insert a master article, add its tokens and bump the job counter
    async fn insert_master(
        &self,
        article: NewArticle,
        day: NaiveDate,
        guard: QuotaGuard,
    ) -> Result<InsertOutcome, StoreError>;

    /// Insert a translation and add its tokens; the job counter is untouched
    async fn insert_translation(
        &self,
        article: NewArticle,
        day: NaiveDate,
    ) -> Result<InsertOutcome, StoreError>;
}

/// Thread-safe shared store
pub type SharedContentStore = Arc<dyn ContentStore>;

/// Open the configured backend
pub async fn open_store(config: &DatabaseConfig) -> Result<SharedContentStore, StoreError> {
    match config.backend {
        DatabaseBackend::Sqlite => {
            let store = SqliteContentStore::open(&config.sqlite_path)?;
            Ok(Arc::new(store))
        }
        DatabaseBackend::Postgres => {
            let store = PgContentStore::connect(&config.postgres_url, config.pool_size).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Upsert configured categories; returns the resulting rows in seed order
pub async fn seed_categories(
    store: &dyn ContentStore,
    seeds: &[CategorySeed],
) -> Result<Vec<Category>, StoreError> {
    let mut categories = Vec::with_capacity(seeds.len());
    for seed in seeds {
        categories.push(store.upsert_category(&seed.slug, &seed.display_name).await?);
    }
    Ok(categories)
}
