//! Configuration management for dailyquill
//!
//! Configuration is read from a TOML file, then overridden by `DAILYQUILL_*`
//! environment variables, then validated.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "dailyquill.toml";

/// Upper bound for explicit chunk counts
pub const MAX_CHUNK_COUNT: i64 = 10;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub window: WindowConfig,
    pub translation: TranslationConfig,
    pub rotation: RotationConfig,
    pub providers: Vec<ProviderConfig>,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub site: SiteConfig,
    pub publish: PublishConfig,
    pub logging: LoggingConfig,

    /// Categories seeded into the store at startup
    pub categories: Vec<CategorySeed>,

    /// Per-category prompt overrides keyed by category slug
    pub prompts: HashMap<String, PromptOverride>,
}

/// Daily generation targets and languages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Master articles per category per day
    pub daily_target_per_category: u32,

    /// Language the master article is written in
    pub source_language: String,

    /// Languages every master article is translated into
    pub target_languages: Vec<String>,

    /// Prefer web-search-capable models for master generation
    pub web_search: bool,

    /// Optional wall-clock budget for one run
    pub max_run_minutes: Option<u64>,

    /// Target languages translated concurrently per master article
    pub translation_concurrency: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            daily_target_per_category: 2,
            source_language: String::from("en"),
            target_languages: vec![String::from("es"), String::from("fr"), String::from("de")],
            web_search: false,
            max_run_minutes: None,
            translation_concurrency: 3,
        }
    }
}

/// Generation window for scheduled runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// First hour (local to `utc_offset_minutes`) in which scheduled runs may start
    pub start_hour: u32,

    /// Hour at which the window closes; smaller than `start_hour` wraps midnight
    pub end_hour: u32,

    /// Offset applied to UTC before reading the hour
    pub utc_offset_minutes: i32,

    /// Minimum time since the last successful run
    pub min_interval_minutes: u64,

    /// Scheduler tick interval
    pub tick_secs: u64,

    /// Run a catch-up check when the process starts
    pub run_on_startup: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start_hour: 2,
            end_hour: 6,
            utc_offset_minutes: 0,
            min_interval_minutes: 360,
            tick_secs: 300,
            run_on_startup: true,
        }
    }
}

/// Chunked translation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Character budget per chunk in automatic mode
    pub max_chunk_chars: usize,

    /// Chunk count used when a request does not name one (0 = automatic)
    pub default_chunk_count: i64,

    /// Chunks of one document translated concurrently
    pub chunk_concurrency: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 6000,
            default_chunk_count: 0,
            chunk_concurrency: 2,
        }
    }
}

/// Credential rotation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Attempts per provider request; defaults to the ring size
    pub max_attempts: Option<u32>,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,

    /// Seed the ring's starting position from the date
    pub seed_by_date: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            seed_by_date: true,
        }
    }
}

/// Supported provider protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions
    OpenAi,
    /// Ollama `/api/chat`
    Ollama,
}

/// One generation provider and its credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    pub kind: ProviderKind,

    /// Base URL, e.g. `https://api.openai.com/v1` or `http://localhost:11434`
    pub endpoint: String,

    pub model: String,

    /// Model used when web search is requested
    #[serde(default)]
    pub search_model: Option<String>,

    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Environment variable holding a comma separated key list
    #[serde(default)]
    pub api_keys_env: Option<String>,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider_timeout() -> u64 {
    120
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderConfig {
    /// Local Ollama provider used by the default configuration
    pub fn local_ollama() -> Self {
        Self {
            name: String::from("ollama"),
            kind: ProviderKind::Ollama,
            endpoint: String::from("http://localhost:11434"),
            model: String::from("qwen2.5:7b"),
            search_model: None,
            api_keys: Vec::new(),
            api_keys_env: None,
            timeout_secs: default_provider_timeout(),
            requests_per_minute: default_requests_per_minute(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    /// Inline keys followed by keys from `api_keys_env`, blanks dropped
    pub fn resolved_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .api_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if let Some(var) = &self.api_keys_env {
            if let Ok(list) = std::env::var(var) {
                keys.extend(
                    list.split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty()),
                );
            }
        }

        keys
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Database backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,

    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// PostgreSQL connection string
    pub postgres_url: String,

    /// Maximum pool size
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Sqlite,
            sqlite_path: PathBuf::from("data/dailyquill.db"),
            postgres_url: String::from("postgresql://localhost/dailyquill"),
            pool_size: 10,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Attach a request tracing layer
    pub request_logging: bool,
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
            request_logging: true,
            cors_permissive: true,
        }
    }
}

/// Public site settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Base URL used for canonical article links
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://example.com"),
        }
    }
}

/// Publication hook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Webhook notified after each committed article
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Category seed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySeed {
    pub slug: String,
    pub display_name: String,
}

/// Prompt override for one category; missing parts fall back to the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOverride {
    pub system: Option<String>,
    pub user: Option<String>,
}

impl Config {
    /// Load configuration from an explicit file, `dailyquill.toml`, or defaults,
    /// then apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply `DAILYQUILL_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_parse::<u32>("DAILYQUILL_DAILY_TARGET")? {
            self.generation.daily_target_per_category = v;
        }
        if let Ok(v) = std::env::var("DAILYQUILL_SOURCE_LANGUAGE") {
            self.generation.source_language = v.trim().to_string();
        }
        if let Ok(v) = std::env::var("DAILYQUILL_TARGET_LANGUAGES") {
            self.generation.target_languages = split_list(&v);
        }
        if let Some(v) = env_parse::<bool>("DAILYQUILL_WEB_SEARCH")? {
            self.generation.web_search = v;
        }
        if let Some(v) = env_parse::<u64>("DAILYQUILL_MAX_RUN_MINUTES")? {
            self.generation.max_run_minutes = Some(v);
        }
        if let Some(v) = env_parse::<u32>("DAILYQUILL_WINDOW_START")? {
            self.window.start_hour = v;
        }
        if let Some(v) = env_parse::<u32>("DAILYQUILL_WINDOW_END")? {
            self.window.end_hour = v;
        }
        if let Some(v) = env_parse::<i64>("DAILYQUILL_DEFAULT_CHUNK_COUNT")? {
            self.translation.default_chunk_count = v;
        }
        if let Ok(v) = std::env::var("DAILYQUILL_DB_BACKEND") {
            self.database.backend = match v.trim().to_ascii_lowercase().as_str() {
                "sqlite" => DatabaseBackend::Sqlite,
                "postgres" | "postgresql" => DatabaseBackend::Postgres,
                other => anyhow::bail!("DAILYQUILL_DB_BACKEND: unknown backend '{other}'"),
            };
        }
        if let Ok(v) = std::env::var("DAILYQUILL_SQLITE_PATH") {
            self.database.sqlite_path = PathBuf::from(v);
        }
        if let Ok(v) =
            std::env::var("DAILYQUILL_POSTGRES_URL").or_else(|_| std::env::var("DATABASE_URL"))
        {
            self.database.postgres_url = v;
        }
        if let Ok(v) = std::env::var("DAILYQUILL_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_parse::<u16>("DAILYQUILL_PORT")? {
            self.server.port = v;
        }
        if let Ok(v) = std::env::var("DAILYQUILL_BASE_URL") {
            self.site.base_url = v;
        }
        if let Ok(v) = std::env::var("DAILYQUILL_WEBHOOK_URL") {
            self.publish.webhook_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = std::env::var("DAILYQUILL_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("DAILYQUILL_LOG_FORMAT") {
            self.logging.format = v;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let generation = &self.generation;
        if generation.daily_target_per_category == 0 {
            anyhow::bail!("daily_target_per_category must be greater than 0");
        }
        if !is_language_code(&generation.source_language) {
            anyhow::bail!("invalid source_language '{}'", generation.source_language);
        }
        for lang in &generation.target_languages {
            if !is_language_code(lang) {
                anyhow::bail!("invalid target language '{lang}'");
            }
            if lang.eq_ignore_ascii_case(&generation.source_language) {
                anyhow::bail!("target language '{lang}' equals the source language");
            }
        }
        if generation.translation_concurrency == 0 {
            anyhow::bail!("translation_concurrency must be greater than 0");
        }
        if generation.max_run_minutes == Some(0) {
            anyhow::bail!("max_run_minutes must be greater than 0 when set");
        }

        if self.window.start_hour > 23 || self.window.end_hour > 23 {
            anyhow::bail!("window hours must be within 0-23");
        }
        if self.window.utc_offset_minutes.abs() > 14 * 60 {
            anyhow::bail!("utc_offset_minutes must be within +/-14 hours");
        }
        if self.window.tick_secs == 0 {
            anyhow::bail!("tick_secs must be greater than 0");
        }

        if !(0..=MAX_CHUNK_COUNT).contains(&self.translation.default_chunk_count) {
            anyhow::bail!(
                "default_chunk_count must be within 0-{MAX_CHUNK_COUNT}, got {}",
                self.translation.default_chunk_count
            );
        }
        if self.translation.max_chunk_chars < 200 {
            anyhow::bail!("max_chunk_chars must be at least 200");
        }
        if self.translation.chunk_concurrency == 0 {
            anyhow::bail!("chunk_concurrency must be greater than 0");
        }

        if self.rotation.max_attempts == Some(0) {
            anyhow::bail!("rotation.max_attempts must be greater than 0 when set");
        }

        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }
        for provider in &self.providers {
            url::Url::parse(&provider.endpoint)
                .with_context(|| format!("provider '{}': invalid endpoint", provider.name))?;
            if provider.model.trim().is_empty() {
                anyhow::bail!("provider '{}': model must not be empty", provider.name);
            }
            if provider.kind == ProviderKind::OpenAi && provider.resolved_keys().is_empty() {
                anyhow::bail!("provider '{}': no API keys configured", provider.name);
            }
            if provider.requests_per_minute == 0 {
                anyhow::bail!("provider '{}': requests_per_minute must be > 0", provider.name);
            }
            if provider.timeout_secs == 0 {
                anyhow::bail!("provider '{}': timeout_secs must be > 0", provider.name);
            }
        }

        if self.database.pool_size == 0 {
            anyhow::bail!("pool_size must be greater than 0");
        }

        url::Url::parse(&self.site.base_url).context("site.base_url is not a valid URL")?;
        if let Some(webhook) = &self.publish.webhook_url {
            url::Url::parse(webhook).context("publish.webhook_url is not a valid URL")?;
        }

        for seed in &self.categories {
            if !seed.slug.is_ascii() || seed.slug != crate::utils::slugify(&seed.slug) {
                anyhow::bail!("category slug '{}' is not url-safe", seed.slug);
            }
        }

        Ok(())
    }

    /// Provider attempts per request: configured value or the total credential count
    pub fn effective_max_attempts(&self) -> u32 {
        self.rotation.max_attempts.unwrap_or_else(|| {
            let handles: usize = self
                .providers
                .iter()
                .map(|p| p.resolved_keys().len().max(1))
                .sum();
            handles.max(1) as u32
        })
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.window.tick_secs)
    }

    #[must_use]
    pub fn run_budget(&self) -> Option<Duration> {
        self.generation
            .max_run_minutes
            .map(|m| Duration::from_secs(m * 60))
    }

    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            window: WindowConfig::default(),
            translation: TranslationConfig::default(),
            rotation: RotationConfig::default(),
            providers: vec![ProviderConfig::local_ollama()],
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            site: SiteConfig::default(),
            publish: PublishConfig::default(),
            logging: LoggingConfig::default(),
            categories: Vec::new(),
            prompts: HashMap::new(),
        }
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}: invalid value '{raw}': {e}")),
        Err(_) => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Language codes look like `en`, `pt-br` or `zh-hant`
pub fn is_language_code(code: &str) -> bool {
    let len_ok = (2..=8).contains(&code.len());
    len_ok
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && code.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}
