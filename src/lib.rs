//! dailyquill - Daily multilingual article generator
//!
//! Generates a fixed number of master articles per category each day,
//! translates every committed master into the configured languages, and
//! keeps per-day quota and token accounting in a relational store.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`document`] - Structured article documents and provider output parsing
//! - [`translation`] - Chunked, structure-preserving translation
//! - [`provider`] - Generation providers, credential rotation and retries
//! - [`prompts`] - Per-category and translation prompt templates
//! - [`storage`] - Content store backends (SQLite, PostgreSQL) and persistence
//! - [`scheduler`] - Timing gate, quota planner and periodic trigger
//! - [`orchestrator`] - Daily/startup runs and manual operations
//! - [`publish`] - Post-commit publication hooks
//! - [`status`] - Health and progress reporting
//! - [`server`] - HTTP API
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use dailyquill::config::Config;
//! use dailyquill::orchestrator::Orchestrator;
//! use dailyquill::scheduler::RunTrigger;
//! use dailyquill::storage::open_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let store = open_store(&config.database).await?;
//!     let orchestrator = Orchestrator::from_config(&config, store)?;
//!     let report = orchestrator.run(RunTrigger::Manual, chrono::Utc::now()).await;
//!     println!("{}", report.status.as_str());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod publish;
pub mod scheduler;
pub mod server;
pub mod status;
pub mod storage;
pub mod translation;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::document::ArticleDocument;
    pub use crate::error::{Error, ErrorCategory, QuillError, Result};
    pub use crate::models::{ArticleRecord, Category, GenerationJob, JobStatus, TokenCounts};
    pub use crate::orchestrator::{Orchestrator, RunReport, RunStatus};
    pub use crate::scheduler::RunTrigger;
    pub use crate::storage::{ContentStore, SharedContentStore};
    pub use crate::translation::ChunkCount;
}

// Direct re-exports for convenience
pub use models::{ArticleRecord, Category, GenerationJob, JobStatus};
