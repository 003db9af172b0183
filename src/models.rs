// Core data structures for dailyquill

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// Content category articles are generated for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    /// Unique, url-safe identifier
    pub slug: String,
    pub display_name: String,
}

impl Category {
    pub fn new(id: i64, slug: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            slug: slug.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug)
    }
}

/// Status of the daily generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Complete,
    Partial,
    Error,
}

impl JobStatus {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Complete => "complete",
            JobStatus::Partial => "partial",
            JobStatus::Error => "error",
        }
    }

    /// Whether a run has closed the job
    pub fn is_final(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored job status outside the known set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status '{0}'")]
pub struct UnknownJobStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownJobStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "complete" => Ok(JobStatus::Complete),
            "partial" => Ok(JobStatus::Partial),
            "error" => Ok(JobStatus::Error),
            other => Err(UnknownJobStatus(other.to_string())),
        }
    }
}

/// One row per calendar day tracking master-article progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub job_date: NaiveDate,
    pub target_count: u32,
    /// Only incremented by a committed master-article insert
    pub generated_count: u32,
    pub status: JobStatus,
    pub error_summary: Option<String>,
    /// Structured run summary attached at finalization (JSON)
    pub summary: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Remaining master articles against the day's target
    pub fn remaining(&self) -> u32 {
        self.target_count.saturating_sub(self.generated_count)
    }
}

/// Input token / output token pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenCounts {
    pub tokens_in: u64,
    pub tokens_out: u64,
}

impl TokenCounts {
    pub fn new(tokens_in: u64, tokens_out: u64) -> Self {
        Self {
            tokens_in,
            tokens_out,
        }
    }

    pub fn total(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }

    pub fn is_zero(&self) -> bool {
        self.tokens_in == 0 && self.tokens_out == 0
    }
}

impl Add for TokenCounts {
    type Output = TokenCounts;

    fn add(self, rhs: Self) -> Self::Output {
        TokenCounts {
            tokens_in: self.tokens_in + rhs.tokens_in,
            tokens_out: self.tokens_out + rhs.tokens_out,
        }
    }
}

impl AddAssign for TokenCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.tokens_in += rhs.tokens_in;
        self.tokens_out += rhs.tokens_out;
    }
}

/// Daily token ledger entry; only ever grows within a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub day: NaiveDate,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

impl TokenUsage {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            tokens_in: 0,
            tokens_out: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

/// Article ready to be written into a language shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub language_code: String,
    pub category_id: i64,
    pub content_hash: String,
    pub meta_title: String,
    pub meta_description: String,
    pub canonical_url: String,
    pub reading_time_minutes: u32,
    pub ai_model: String,
    pub ai_prompt: String,
    pub tokens: TokenCounts,
    /// Set for translations; points at the master slug
    pub master_slug: Option<String>,
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl NewArticle {
    pub fn is_master(&self) -> bool {
        self.master_slug.is_none()
    }
}

/// Persisted article row in one language shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub language_code: String,
    pub category_id: i64,
    pub content_hash: String,
    pub meta_title: String,
    pub meta_description: String,
    pub canonical_url: String,
    pub reading_time_minutes: u32,
    pub ai_model: String,
    pub ai_prompt: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub total_tokens: u64,
    pub master_slug: Option<String>,
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// Build the stored row from an insert payload and its assigned id
    pub fn from_new(id: i64, article: NewArticle) -> Self {
        Self {
            id,
            slug: article.slug,
            title: article.title,
            content: article.content,
            summary: article.summary,
            language_code: article.language_code,
            category_id: article.category_id,
            content_hash: article.content_hash,
            meta_title: article.meta_title,
            meta_description: article.meta_description,
            canonical_url: article.canonical_url,
            reading_time_minutes: article.reading_time_minutes,
            ai_model: article.ai_model,
            ai_prompt: article.ai_prompt,
            tokens_in: article.tokens.tokens_in,
            tokens_out: article.tokens.tokens_out,
            total_tokens: article.tokens.total(),
            master_slug: article.master_slug,
            source_url: article.source_url,
            published_at: article.published_at,
        }
    }

    pub fn is_master(&self) -> bool {
        self.master_slug.is_none()
    }
}
