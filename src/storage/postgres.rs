//! PostgreSQL content store
//!
//! Master inserts lock the day's job row first, so the quota guard is exact
//! for concurrent writers on the same database.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use deadpool_postgres::{
    Config as PgConfig, GenericClient, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod,
    Runtime,
};
use std::collections::HashMap;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use super::{all_shards, shard_for, ContentStore, InsertOutcome, QuotaGuard, StoreError};
use crate::models::{
    ArticleRecord, Category, GenerationJob, JobStatus, NewArticle, TokenUsage, UnknownJobStatus,
};

const ARTICLE_COLUMNS: &str = "id, slug, title, content, summary, language_code, category_id, \
     content_hash, meta_title, meta_description, canonical_url, reading_time_minutes, ai_model, \
     ai_prompt, tokens_in, tokens_out, total_tokens, master_slug, source_url, published_at";

const JOB_COLUMNS: &str =
    "job_date, target_count, generated_count, status, error_summary, summary, created_at, updated_at";

/// PostgreSQL implementation of [`ContentStore`]
pub struct PgContentStore {
    pool: Pool,
}

/// What happened inside an insert transaction
enum TxOutcome {
    Written(i64),
    Existing(ArticleRecord),
    QuotaMet,
}

impl PgContentStore {
    /// Create the pool and the schema
    pub async fn connect(url: &str, pool_size: usize) -> Result<Self, StoreError> {
        let mut cfg = PgConfig::new();
        cfg.url = Some(url.to_string());
        cfg.pool = Some(PoolConfig::new(pool_size.max(1)));
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Unavailable(format!("cannot create pool: {e}")))?;

        let store = Self { pool };
        store.create_schema().await?;

        tracing::info!(pool_size = pool_size, "PostgreSQL content store initialized");
        Ok(store)
    }

    async fn client(&self) -> Result<Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS categories (
                    id BIGSERIAL PRIMARY KEY,
                    slug TEXT NOT NULL UNIQUE,
                    display_name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS generation_jobs (
                    job_date DATE PRIMARY KEY,
                    target_count INTEGER NOT NULL DEFAULT 0,
                    generated_count INTEGER NOT NULL DEFAULT 0,
                    status TEXT NOT NULL DEFAULT 'pending',
                    error_summary TEXT,
                    summary JSONB,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
                );

                CREATE TABLE IF NOT EXISTS token_usage (
                    day DATE PRIMARY KEY,
                    tokens_in BIGINT NOT NULL DEFAULT 0,
                    tokens_out BIGINT NOT NULL DEFAULT 0,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
                );
                "#,
            )
            .await
            .map_err(|e| pg_error("create schema", e))?;

        for table in all_shards() {
            client
                .batch_execute(&format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS {table} (
                        id BIGSERIAL PRIMARY KEY,
                        slug TEXT NOT NULL UNIQUE,
                        title TEXT NOT NULL,
                        content TEXT NOT NULL,
                        summary TEXT NOT NULL,
                        language_code TEXT NOT NULL,
                        category_id BIGINT NOT NULL REFERENCES categories(id),
                        content_hash TEXT NOT NULL,
                        meta_title TEXT NOT NULL,
                        meta_description TEXT NOT NULL,
                        canonical_url TEXT NOT NULL,
                        reading_time_minutes INTEGER NOT NULL,
                        ai_model TEXT NOT NULL,
                        ai_prompt TEXT NOT NULL,
                        tokens_in BIGINT NOT NULL DEFAULT 0,
                        tokens_out BIGINT NOT NULL DEFAULT 0,
                        total_tokens BIGINT NOT NULL DEFAULT 0,
                        master_slug TEXT,
                        source_url TEXT,
                        published_at TIMESTAMPTZ NOT NULL,
                        generated_on DATE NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_{table}_daily
                        ON {table}(generated_on, category_id);
                    "#
                ))
                .await
                .map_err(|e| pg_error("create shard", e))?;
        }

        Ok(())
    }

    /// Shared insert path; `guard` is `Some` for master articles
    async fn insert_article(
        &self,
        article: NewArticle,
        day: NaiveDate,
        guard: Option<QuotaGuard>,
    ) -> Result<InsertOutcome, StoreError> {
        let mut client = self.client().await?;

        let result = {
            let tx = client
                .transaction()
                .await
                .map_err(|e| pg_error("begin", e))?;
            match write_in_tx(&tx, &article, day, guard).await {
                Ok(TxOutcome::Written(id)) => tx.commit().await.map(|_| TxOutcome::Written(id)),
                // dropping the transaction rolls it back
                other => other,
            }
        };

        match result {
            Ok(TxOutcome::Written(id)) => Ok(InsertOutcome::Inserted(ArticleRecord::from_new(
                id, article,
            ))),
            Ok(TxOutcome::Existing(record)) => Ok(InsertOutcome::Duplicate(record)),
            Ok(TxOutcome::QuotaMet) => Ok(InsertOutcome::QuotaMet),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                // a concurrent writer committed the same slug first
                find_in(&client, &article.language_code, &article.slug)
                    .await
                    .map_err(|e| pg_error("find article", e))?
                    .map(InsertOutcome::Duplicate)
                    .ok_or_else(|| StoreError::query("insert article", "unique violation on missing row"))
            }
            Err(e) => Err(pg_error("insert article", e)),
        }
    }
}

fn pg_error(operation: &str, err: tokio_postgres::Error) -> StoreError {
    if err.is_closed() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::query(operation, err)
    }
}

fn corrupt(table: &str, err: tokio_postgres::Error) -> StoreError {
    StoreError::Corrupt {
        table: table.to_string(),
        reason: err.to_string(),
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn article_from_row(row: &Row) -> Result<ArticleRecord, tokio_postgres::Error> {
    Ok(ArticleRecord {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        language_code: row.try_get("language_code")?,
        category_id: row.try_get("category_id")?,
        content_hash: row.try_get("content_hash")?,
        meta_title: row.try_get("meta_title")?,
        meta_description: row.try_get("meta_description")?,
        canonical_url: row.try_get("canonical_url")?,
        reading_time_minutes: row.try_get::<_, i32>("reading_time_minutes")?.max(0) as u32,
        ai_model: row.try_get("ai_model")?,
        ai_prompt: row.try_get("ai_prompt")?,
        tokens_in: row.try_get::<_, i64>("tokens_in")?.max(0) as u64,
        tokens_out: row.try_get::<_, i64>("tokens_out")?.max(0) as u64,
        total_tokens: row.try_get::<_, i64>("total_tokens")?.max(0) as u64,
        master_slug: row.try_get("master_slug")?,
        source_url: row.try_get("source_url")?,
        published_at: row.try_get("published_at")?,
    })
}

fn job_from_row(row: &Row) -> Result<GenerationJob, StoreError> {
    let column = |e| corrupt("generation_jobs", e);
    let status: String = row.try_get("status").map_err(column)?;
    let status = status.parse().map_err(|e: UnknownJobStatus| StoreError::Corrupt {
        table: "generation_jobs".to_string(),
        reason: e.to_string(),
    })?;
    Ok(GenerationJob {
        job_date: row.try_get("job_date").map_err(column)?,
        target_count: row.try_get::<_, i32>("target_count").map_err(column)?.max(0) as u32,
        generated_count: row
            .try_get::<_, i32>("generated_count")
            .map_err(column)?
            .max(0) as u32,
        status,
        error_summary: row.try_get("error_summary").map_err(column)?,
        summary: row.try_get("summary").map_err(column)?,
        created_at: row.try_get("created_at").map_err(column)?,
        updated_at: row.try_get("updated_at").map_err(column)?,
    })
}

fn category_from_row(row: &Row) -> Result<Category, tokio_postgres::Error> {
    Ok(Category::new(
        row.try_get("id")?,
        row.try_get::<_, String>("slug")?,
        row.try_get::<_, String>("display_name")?,
    ))
}

async fn find_in<C: GenericClient + Sync>(
    client: &C,
    language: &str,
    slug: &str,
) -> Result<Option<ArticleRecord>, tokio_postgres::Error> {
    let table = shard_for(language);
    let row = client
        .query_opt(
            &format!("SELECT {ARTICLE_COLUMNS} FROM {table} WHERE slug = $1 AND language_code = $2"),
            &[&slug, &language],
        )
        .await?;
    row.as_ref().map(article_from_row).transpose()
}

async fn write_in_tx<C: GenericClient + Sync>(
    tx: &C,
    article: &NewArticle,
    day: NaiveDate,
    guard: Option<QuotaGuard>,
) -> Result<TxOutcome, tokio_postgres::Error> {
    let table = shard_for(&article.language_code);
    let now = Utc::now();

    if guard.is_some() {
        // serialize master inserts for the day on the job row
        tx.execute(
            "INSERT INTO generation_jobs (job_date, created_at, updated_at) VALUES ($1, $2, $2) \
             ON CONFLICT (job_date) DO NOTHING",
            &[&day, &now],
        )
        .await?;
        tx.query_one(
            "SELECT generated_count FROM generation_jobs WHERE job_date = $1 FOR UPDATE",
            &[&day],
        )
        .await?;
    }

    if let Some(existing) = find_in(tx, &article.language_code, &article.slug).await? {
        return Ok(TxOutcome::Existing(existing));
    }

    if let Some(target) = guard.and_then(|g| g.per_category_target) {
        let row = tx
            .query_one(
                &format!(
                    "SELECT COUNT(*) FROM {table} \
                     WHERE category_id = $1 AND generated_on = $2 AND master_slug IS NULL"
                ),
                &[&article.category_id, &day],
            )
            .await?;
        let committed: i64 = row.try_get(0)?;
        if committed >= i64::from(target) {
            return Ok(TxOutcome::QuotaMet);
        }
    }

    let reading_time = article.reading_time_minutes as i32;
    let tokens_in = article.tokens.tokens_in as i64;
    let tokens_out = article.tokens.tokens_out as i64;
    let total = article.tokens.total() as i64;

    let row = tx
        .query_one(
            &format!(
                "INSERT INTO {table} (slug, title, content, summary, language_code, category_id, \
                 content_hash, meta_title, meta_description, canonical_url, reading_time_minutes, \
                 ai_model, ai_prompt, tokens_in, tokens_out, total_tokens, master_slug, \
                 source_url, published_at, generated_on) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                 $17, $18, $19, $20) RETURNING id"
            ),
            &[
                &article.slug,
                &article.title,
                &article.content,
                &article.summary,
                &article.language_code,
                &article.category_id,
                &article.content_hash,
                &article.meta_title,
                &article.meta_description,
                &article.canonical_url,
                &reading_time,
                &article.ai_model,
                &article.ai_prompt,
                &tokens_in,
                &tokens_out,
                &total,
                &article.master_slug,
                &article.source_url,
                &article.published_at,
                &day,
            ],
        )
        .await?;
    let id: i64 = row.try_get(0)?;

    tx.execute(
        "INSERT INTO token_usage (day, tokens_in, tokens_out, updated_at) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (day) DO UPDATE SET \
             tokens_in = token_usage.tokens_in + EXCLUDED.tokens_in, \
             tokens_out = token_usage.tokens_out + EXCLUDED.tokens_out, \
             updated_at = EXCLUDED.updated_at",
        &[&day, &tokens_in, &tokens_out, &now],
    )
    .await?;

    if guard.is_some() {
        tx.execute(
            "UPDATE generation_jobs SET generated_count = generated_count + 1, updated_at = $2 \
             WHERE job_date = $1",
            &[&day, &now],
        )
        .await?;
    }

    Ok(TxOutcome::Written(id))
}

// ============================================================================
// ContentStore Implementation
// ============================================================================

#[async_trait]
impl ContentStore for PgContentStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| pg_error("ping", e))?;
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query("SELECT id, slug, display_name FROM categories ORDER BY id", &[])
            .await
            .map_err(|e| pg_error("list categories", e))?;
        rows.iter()
            .map(category_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| corrupt("categories", e))
    }

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, slug, display_name FROM categories WHERE slug = $1",
                &[&slug],
            )
            .await
            .map_err(|e| pg_error("find category", e))?;
        row.as_ref()
            .map(category_from_row)
            .transpose()
            .map_err(|e| corrupt("categories", e))
    }

    async fn upsert_category(
        &self,
        slug: &str,
        display_name: &str,
    ) -> Result<Category, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO categories (slug, display_name) VALUES ($1, $2) \
                 ON CONFLICT (slug) DO UPDATE SET display_name = EXCLUDED.display_name \
                 RETURNING id, slug, display_name",
                &[&slug, &display_name],
            )
            .await
            .map_err(|e| pg_error("upsert category", e))?;
        category_from_row(&row).map_err(|e| corrupt("categories", e))
    }

    async fn count_generated(
        &self,
        day: NaiveDate,
        source_language: &str,
    ) -> Result<HashMap<i64, u32>, StoreError> {
        let table = shard_for(source_language);
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT category_id, COUNT(*) FROM {table} \
                     WHERE generated_on = $1 AND language_code = $2 AND master_slug IS NULL \
                     GROUP BY category_id"
                ),
                &[&day, &source_language],
            )
            .await
            .map_err(|e| pg_error("count generated", e))?;

        rows.iter()
            .map(|row| -> Result<(i64, u32), tokio_postgres::Error> {
                let id: i64 = row.try_get(0)?;
                let count: i64 = row.try_get(1)?;
                Ok((id, count.max(0) as u32))
            })
            .collect::<Result<_, _>>()
            .map_err(|e| corrupt(table, e))
    }

    async fn job_for(&self, day: NaiveDate) -> Result<Option<GenerationJob>, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {JOB_COLUMNS} FROM generation_jobs WHERE job_date = $1"),
                &[&day],
            )
            .await
            .map_err(|e| pg_error("load job", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn last_successful_job(&self) -> Result<Option<GenerationJob>, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM generation_jobs \
                     WHERE status IN ('complete', 'partial') \
                     ORDER BY job_date DESC, updated_at DESC LIMIT 1"
                ),
                &[],
            )
            .await
            .map_err(|e| pg_error("load last job", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn ensure_job(&self, day: NaiveDate, target: u32) -> Result<GenerationJob, StoreError> {
        let client = self.client().await?;
        let target = target as i32;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO generation_jobs (job_date, target_count, created_at, updated_at) \
                     VALUES ($1, $2, $3, $3) \
                     ON CONFLICT (job_date) DO UPDATE SET \
                         target_count = EXCLUDED.target_count, \
                         updated_at = EXCLUDED.updated_at \
                     RETURNING {JOB_COLUMNS}"
                ),
                &[&day, &target, &Utc::now()],
            )
            .await
            .map_err(|e| pg_error("ensure job", e))?;
        job_from_row(&row)
    }

    async fn finalize_job(
        &self,
        day: NaiveDate,
        status: JobStatus,
        error_summary: Option<String>,
        summary: Option<serde_json::Value>,
    ) -> Result<GenerationJob, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO generation_jobs \
                         (job_date, status, error_summary, summary, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $5) \
                     ON CONFLICT (job_date) DO UPDATE SET \
                         status = EXCLUDED.status, \
                         error_summary = EXCLUDED.error_summary, \
                         summary = EXCLUDED.summary, \
                         updated_at = EXCLUDED.updated_at \
                     RETURNING {JOB_COLUMNS}"
                ),
                &[&day, &status.as_str(), &error_summary, &summary, &Utc::now()],
            )
            .await
            .map_err(|e| pg_error("finalize job", e))?;
        job_from_row(&row)
    }

    async fn token_usage(&self, day: NaiveDate) -> Result<TokenUsage, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT tokens_in, tokens_out FROM token_usage WHERE day = $1",
                &[&day],
            )
            .await
            .map_err(|e| pg_error("load token usage", e))?;

        let Some(row) = row else {
            return Ok(TokenUsage::empty(day));
        };
        let tokens_in: i64 = row.try_get(0).map_err(|e| corrupt("token_usage", e))?;
        let tokens_out: i64 = row.try_get(1).map_err(|e| corrupt("token_usage", e))?;
        Ok(TokenUsage {
            day,
            tokens_in: tokens_in.max(0) as u64,
            tokens_out: tokens_out.max(0) as u64,
        })
    }

    async fn find_article(
        &self,
        language: &str,
        slug: &str,
    ) -> Result<Option<ArticleRecord>, StoreError> {
        let client = self.client().await?;
        find_in(&client, language, slug)
            .await
            .map_err(|e| pg_error("find article", e))
    }

    async fn insert_master(
        &self,
        article: NewArticle,
        day: NaiveDate,
        guard: QuotaGuard,
    ) -> Result<InsertOutcome, StoreError> {
        self.insert_article(article, day, Some(guard)).await
    }

    async fn insert_translation(
        &self,
        article: NewArticle,
        day: NaiveDate,
    ) -> Result<InsertOutcome, StoreError> {
        self.insert_article(article, day, None).await
    }
}
