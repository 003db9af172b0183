//! SQLite content store
//!
//! One connection behind a mutex; every call runs on the blocking pool.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{all_shards, shard_for, ContentStore, InsertOutcome, QuotaGuard, StoreError};
use crate::models::{ArticleRecord, Category, GenerationJob, JobStatus, NewArticle, TokenUsage};

const ARTICLE_COLUMNS: &str = "id, slug, title, content, summary, language_code, category_id, \
     content_hash, meta_title, meta_description, canonical_url, reading_time_minutes, ai_model, \
     ai_prompt, tokens_in, tokens_out, total_tokens, master_slug, source_url, published_at";

const JOB_COLUMNS: &str =
    "job_date, target_count, generated_count, status, error_summary, summary, created_at, updated_at";

/// SQLite implementation of [`ContentStore`]
pub struct SqliteContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteContentStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("cannot open {}: {e}", path.display())))?;

        // WAL lets readers proceed while a run is writing
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::query("configure sqlite", e))?;

        create_schema(&conn)?;

        tracing::info!(path = %path.display(), "SQLite content store initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("cannot open in-memory sqlite: {e}")))?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable(String::from("sqlite connection poisoned")))?;
            f(&mut guard).map_err(|e| map_sqlite_error(operation, e))
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("sqlite worker failed: {e}")))?
    }
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS generation_jobs (
                job_date TEXT PRIMARY KEY,
                target_count INTEGER NOT NULL DEFAULT 0,
                generated_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                error_summary TEXT,
                summary TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS token_usage (
                day TEXT PRIMARY KEY,
                tokens_in INTEGER NOT NULL DEFAULT 0,
                tokens_out INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            "#,
    )
    .map_err(|e| StoreError::query("create schema", e))?;

    for table in all_shards() {
        conn.execute_batch(&format!(
            r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    slug TEXT NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    summary TEXT NOT NULL,
                    language_code TEXT NOT NULL,
                    category_id INTEGER NOT NULL,
                    content_hash TEXT NOT NULL,
                    meta_title TEXT NOT NULL,
                    meta_description TEXT NOT NULL,
                    canonical_url TEXT NOT NULL,
                    reading_time_minutes INTEGER NOT NULL,
                    ai_model TEXT NOT NULL,
                    ai_prompt TEXT NOT NULL,
                    tokens_in INTEGER NOT NULL DEFAULT 0,
                    tokens_out INTEGER NOT NULL DEFAULT 0,
                    total_tokens INTEGER NOT NULL DEFAULT 0,
                    master_slug TEXT,
                    source_url TEXT,
                    published_at TEXT NOT NULL,
                    generated_on TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_{table}_daily
                    ON {table}(generated_on, category_id);

                CREATE INDEX IF NOT EXISTS idx_{table}_hash
                    ON {table}(content_hash);
                "#
        ))
        .map_err(|e| StoreError::query("create shard", e))?;
    }

    Ok(())
}

fn map_sqlite_error(operation: &str, err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::CannotOpen
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::NotADatabase
            ) =>
        {
            StoreError::Unavailable(err.to_string())
        }
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            StoreError::Corrupt {
                table: operation.to_string(),
                reason: err.to_string(),
            }
        }
        _ => StoreError::query(operation, err),
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    raw.parse::<NaiveDate>().map_err(|e| conversion_error(idx, e))
}

fn count_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<ArticleRecord> {
    Ok(ArticleRecord {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        summary: row.get(4)?,
        language_code: row.get(5)?,
        category_id: row.get(6)?,
        content_hash: row.get(7)?,
        meta_title: row.get(8)?,
        meta_description: row.get(9)?,
        canonical_url: row.get(10)?,
        reading_time_minutes: count_at(row, 11)? as u32,
        ai_model: row.get(12)?,
        ai_prompt: row.get(13)?,
        tokens_in: count_at(row, 14)?,
        tokens_out: count_at(row, 15)?,
        total_tokens: count_at(row, 16)?,
        master_slug: row.get(17)?,
        source_url: row.get(18)?,
        published_at: timestamp_at(row, 19)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<GenerationJob> {
    let summary = match row.get::<_, Option<String>>(5)? {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| conversion_error(5, e))?),
        None => None,
    };

    Ok(GenerationJob {
        job_date: date_at(row, 0)?,
        target_count: count_at(row, 1)? as u32,
        generated_count: count_at(row, 2)? as u32,
        status: row
            .get::<_, String>(3)?
            .parse::<JobStatus>()
            .map_err(|e| conversion_error(3, e))?,
        error_summary: row.get(4)?,
        summary,
        created_at: timestamp_at(row, 6)?,
        updated_at: timestamp_at(row, 7)?,
    })
}

fn find_in(
    conn: &Connection,
    language: &str,
    slug: &str,
) -> rusqlite::Result<Option<ArticleRecord>> {
    let table = shard_for(language);
    conn.query_row(
        &format!("SELECT {ARTICLE_COLUMNS} FROM {table} WHERE slug = ?1 AND language_code = ?2"),
        params![slug, language],
        article_from_row,
    )
    .optional()
}

fn select_job(conn: &Connection, day: &str) -> rusqlite::Result<Option<GenerationJob>> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM generation_jobs WHERE job_date = ?1"),
        params![day],
        job_from_row,
    )
    .optional()
}

fn required_job(conn: &Connection, day: &str) -> rusqlite::Result<GenerationJob> {
    select_job(conn, day)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Write the article row plus its token ledger entry; caller owns the transaction
fn write_article(conn: &Connection, article: &NewArticle, day: &str) -> rusqlite::Result<i64> {
    let table = shard_for(&article.language_code);
    conn.execute(
        &format!(
            "INSERT INTO {table} (slug, title, content, summary, language_code, category_id, \
             content_hash, meta_title, meta_description, canonical_url, reading_time_minutes, \
             ai_model, ai_prompt, tokens_in, tokens_out, total_tokens, master_slug, source_url, \
             published_at, generated_on) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
             ?18, ?19, ?20)"
        ),
        params![
            article.slug,
            article.title,
            article.content,
            article.summary,
            article.language_code,
            article.category_id,
            article.content_hash,
            article.meta_title,
            article.meta_description,
            article.canonical_url,
            article.reading_time_minutes as i64,
            article.ai_model,
            article.ai_prompt,
            article.tokens.tokens_in as i64,
            article.tokens.tokens_out as i64,
            article.tokens.total() as i64,
            article.master_slug,
            article.source_url,
            article.published_at.to_rfc3339(),
            day,
        ],
    )?;
    let id = conn.last_insert_rowid();

    conn.execute(
        r#"
            INSERT INTO token_usage (day, tokens_in, tokens_out, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(day) DO UPDATE SET
                tokens_in = tokens_in + excluded.tokens_in,
                tokens_out = tokens_out + excluded.tokens_out,
                updated_at = excluded.updated_at
            "#,
        params![
            day,
            article.tokens.tokens_in as i64,
            article.tokens.tokens_out as i64,
            Utc::now().to_rfc3339()
        ],
    )?;

    Ok(id)
}

// ============================================================================
// ContentStore Implementation
// ============================================================================

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.run("ping", |conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        self.run("list categories", |conn| {
            let mut stmt = conn.prepare("SELECT id, slug, display_name FROM categories ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(Category::new(row.get(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?;
            rows.collect()
        })
        .await
    }

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError> {
        let slug = slug.to_string();
        self.run("find category", move |conn| {
            conn.query_row(
                "SELECT id, slug, display_name FROM categories WHERE slug = ?1",
                params![slug],
                |row| Ok(Category::new(row.get(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()
        })
        .await
    }

    async fn upsert_category(
        &self,
        slug: &str,
        display_name: &str,
    ) -> Result<Category, StoreError> {
        let slug = slug.to_string();
        let display_name = display_name.to_string();
        self.run("upsert category", move |conn| {
            conn.execute(
                r#"
                    INSERT INTO categories (slug, display_name) VALUES (?1, ?2)
                    ON CONFLICT(slug) DO UPDATE SET display_name = excluded.display_name
                    "#,
                params![slug, display_name],
            )?;
            conn.query_row(
                "SELECT id, slug, display_name FROM categories WHERE slug = ?1",
                params![slug],
                |row| Ok(Category::new(row.get(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
        })
        .await
    }

    async fn count_generated(
        &self,
        day: NaiveDate,
        source_language: &str,
    ) -> Result<HashMap<i64, u32>, StoreError> {
        let table = shard_for(source_language);
        let language = source_language.to_string();
        let day = day_key(day);
        self.run("count generated", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT category_id, COUNT(*) FROM {table} \
                 WHERE generated_on = ?1 AND language_code = ?2 AND master_slug IS NULL \
                 GROUP BY category_id"
            ))?;
            let rows = stmt.query_map(params![day, language], |row| {
                Ok((row.get::<_, i64>(0)?, count_at(row, 1)? as u32))
            })?;
            rows.collect()
        })
        .await
    }

    async fn job_for(&self, day: NaiveDate) -> Result<Option<GenerationJob>, StoreError> {
        let day = day_key(day);
        self.run("load job", move |conn| select_job(conn, &day))
            .await
    }

    async fn last_successful_job(&self) -> Result<Option<GenerationJob>, StoreError> {
        self.run("load last job", |conn| {
            conn.query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM generation_jobs \
                     WHERE status IN ('complete', 'partial') \
                     ORDER BY job_date DESC, updated_at DESC LIMIT 1"
                ),
                [],
                job_from_row,
            )
            .optional()
        })
        .await
    }

    async fn ensure_job(&self, day: NaiveDate, target: u32) -> Result<GenerationJob, StoreError> {
        let day = day_key(day);
        self.run("ensure job", move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                r#"
                    INSERT INTO generation_jobs
                        (job_date, target_count, generated_count, status, created_at, updated_at)
                    VALUES (?1, ?2, 0, 'pending', ?3, ?3)
                    ON CONFLICT(job_date) DO UPDATE SET
                        target_count = excluded.target_count,
                        updated_at = excluded.updated_at
                    "#,
                params![day, target as i64, now],
            )?;
            required_job(conn, &day)
        })
        .await
    }

    async fn finalize_job(
        &self,
        day: NaiveDate,
        status: JobStatus,
        error_summary: Option<String>,
        summary: Option<serde_json::Value>,
    ) -> Result<GenerationJob, StoreError> {
        let day = day_key(day);
        let summary = summary.map(|s| s.to_string());
        self.run("finalize job", move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                r#"
                    INSERT INTO generation_jobs
                        (job_date, target_count, generated_count, status, error_summary, summary,
                         created_at, updated_at)
                    VALUES (?1, 0, 0, ?2, ?3, ?4, ?5, ?5)
                    ON CONFLICT(job_date) DO UPDATE SET
                        status = excluded.status,
                        error_summary = excluded.error_summary,
                        summary = excluded.summary,
                        updated_at = excluded.updated_at
                    "#,
                params![day, status.as_str(), error_summary, summary, now],
            )?;
            required_job(conn, &day)
        })
        .await
    }

    async fn token_usage(&self, day: NaiveDate) -> Result<TokenUsage, StoreError> {
        let key = day_key(day);
        let usage = self
            .run("load token usage", move |conn| {
                conn.query_row(
                    "SELECT tokens_in, tokens_out FROM token_usage WHERE day = ?1",
                    params![key],
                    |row| Ok((count_at(row, 0)?, count_at(row, 1)?)),
                )
                .optional()
            })
            .await?;

        Ok(match usage {
            Some((tokens_in, tokens_out)) => TokenUsage {
                day,
                tokens_in,
                tokens_out,
            },
            None => TokenUsage::empty(day),
        })
    }

    async fn find_article(
        &self,
        language: &str,
        slug: &str,
    ) -> Result<Option<ArticleRecord>, StoreError> {
        let language = language.to_string();
        let slug = slug.to_string();
        self.run("find article", move |conn| find_in(conn, &language, &slug))
            .await
    }

    async fn insert_master(
        &self,
        article: NewArticle,
        day: NaiveDate,
        guard: QuotaGuard,
    ) -> Result<InsertOutcome, StoreError> {
        let day = day_key(day);
        self.run("insert master", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(existing) = find_in(&tx, &article.language_code, &article.slug)? {
                return Ok(InsertOutcome::Duplicate(existing));
            }

            if let Some(target) = guard.per_category_target {
                let table = shard_for(&article.language_code);
                let committed: i64 = tx.query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {table} \
                         WHERE category_id = ?1 AND generated_on = ?2 AND master_slug IS NULL"
                    ),
                    params![article.category_id, day],
                    |row| row.get(0),
                )?;
                if committed >= i64::from(target) {
                    return Ok(InsertOutcome::QuotaMet);
                }
            }

            let id = write_article(&tx, &article, &day)?;
            tx.execute(
                r#"
                    INSERT INTO generation_jobs
                        (job_date, target_count, generated_count, status, created_at, updated_at)
                    VALUES (?1, 0, 1, 'pending', ?2, ?2)
                    ON CONFLICT(job_date) DO UPDATE SET
                        generated_count = generated_count + 1,
                        updated_at = excluded.updated_at
                    "#,
                params![day, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;

            Ok(InsertOutcome::Inserted(ArticleRecord::from_new(id, article)))
        })
        .await
    }

    async fn insert_translation(
        &self,
        article: NewArticle,
        day: NaiveDate,
    ) -> Result<InsertOutcome, StoreError> {
        let day = day_key(day);
        self.run("insert translation", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(existing) = find_in(&tx, &article.language_code, &article.slug)? {
                return Ok(InsertOutcome::Duplicate(existing));
            }

            let id = write_article(&tx, &article, &day)?;
            tx.commit()?;

            Ok(InsertOutcome::Inserted(ArticleRecord::from_new(id, article)))
        })
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================
