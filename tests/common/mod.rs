//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dailyquill::document::{ArticleDocument, FaqEntry, Section};
use dailyquill::models::{
    ArticleRecord, Category, GenerationJob, JobStatus, NewArticle, TokenCounts, TokenUsage,
};
use dailyquill::orchestrator::{Orchestrator, OrchestratorSettings};
use dailyquill::prompts::PromptCatalog;
use dailyquill::provider::{
    CredentialRing, GenerationOutput, GenerationProvider, GenerationRequest, ProviderError,
    ProviderGateway, ProviderHandle,
};
use dailyquill::scheduler::TimingGate;
use dailyquill::storage::{
    ArticlePersister, ContentStore, InsertOutcome, QuotaGuard, SharedContentStore,
    SqliteContentStore, StoreError,
};
use dailyquill::translation::{ChunkCount, TranslationEngine};
use dailyquill::utils::retry::RetryConfig;

/// Tokens reported for every successful call
pub const CALL_TOKENS: TokenCounts = TokenCounts {
    tokens_in: 100,
    tokens_out: 400,
};

const TRANSLATION_MARKER: &str = "Return only the translated text.\n\n";

/// 03:00 UTC, inside the default test window
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap()
}

pub fn today() -> NaiveDate {
    now().date_naive()
}

/// Well-formed article with a caller-chosen title
pub fn article(title: &str) -> ArticleDocument {
    ArticleDocument {
        title: title.to_string(),
        meta_description: String::from("A short description of the article."),
        intro: String::from("Opening paragraph.\n\nSecond opening paragraph."),
        sections: vec![
            Section {
                heading: String::from("First Section"),
                body: String::from("Body of the first section."),
            },
            Section {
                heading: String::from("Second Section"),
                body: String::from("Body of the second section.\n\nWith two paragraphs."),
            },
            Section {
                heading: String::from("Third Section"),
                body: String::from("Body of the third section."),
            },
        ],
        summary: String::from("A short summary."),
        faq: vec![
            FaqEntry {
                question: String::from("First question?"),
                answer: String::from("First answer."),
            },
            FaqEntry {
                question: String::from("Second question?"),
                answer: String::from("Second answer."),
            },
        ],
        keywords: vec![
            String::from("alpha"),
            String::from("beta"),
            String::from("gamma"),
        ],
    }
}

// ============================================================================
// Scripted provider
// ============================================================================

/// What the next call returns
#[derive(Debug, Clone)]
pub enum Reply {
    /// A fresh article for master prompts, the chunk itself for translations
    Default,
    Timeout,
    ServerError,
    /// Text that is not an article
    Garbage,
}

/// Provider that plays back a script, then falls back to [`Reply::Default`]
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    masters: AtomicUsize,
    translations: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_script(name, Vec::new())
    }

    pub fn with_script(name: &str, replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            masters: AtomicUsize::new(0),
            translations: AtomicUsize::new(0),
        })
    }

    /// Every call, including failed ones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn masters_served(&self) -> usize {
        self.masters.load(Ordering::SeqCst)
    }

    pub fn translations_served(&self) -> usize {
        self.translations.load(Ordering::SeqCst)
    }

    pub fn model(&self) -> String {
        format!("{}-model", self.name)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Default);

        let text = match reply {
            Reply::Timeout => {
                return Err(ProviderError::Timeout {
                    provider: self.name.clone(),
                    after_secs: 1,
                })
            }
            Reply::ServerError => {
                return Err(ProviderError::Server {
                    provider: self.name.clone(),
                    status: 503,
                    body: String::from("overloaded"),
                })
            }
            Reply::Garbage => String::from("Sorry, I cannot write that article."),
            Reply::Default => match request.user.split_once(TRANSLATION_MARKER) {
                Some((_, chunk)) => {
                    self.translations.fetch_add(1, Ordering::SeqCst);
                    chunk.to_string()
                }
                None => {
                    let n = self.masters.fetch_add(1, Ordering::SeqCst) + 1;
                    article(&format!("{} Article {n}", self.name)).to_markdown()
                }
            },
        };

        Ok(GenerationOutput {
            text,
            tokens: CALL_TOKENS,
            model: self.model(),
        })
    }
}

// ============================================================================
// Failing store
// ============================================================================

/// Switches that make [`FaultyStore`] report the database as unreachable
#[derive(Debug, Default)]
pub struct StoreFaults {
    pub list_categories: AtomicBool,
    pub ensure_job: AtomicBool,
    /// Master inserts allowed through before every later one fails
    pub masters_before_outage: Option<usize>,
}

impl StoreFaults {
    pub fn planning() -> Arc<Self> {
        Arc::new(Self {
            list_categories: AtomicBool::new(true),
            ..Self::default()
        })
    }

    pub fn job_setup() -> Arc<Self> {
        Arc::new(Self {
            ensure_job: AtomicBool::new(true),
            ..Self::default()
        })
    }

    pub fn after_masters(committed: usize) -> Arc<Self> {
        Arc::new(Self {
            masters_before_outage: Some(committed),
            ..Self::default()
        })
    }
}

fn outage(operation: &str) -> StoreError {
    StoreError::Unavailable(format!("connection refused during {operation}"))
}

/// Delegates to a real store until a configured fault trips
pub struct FaultyStore {
    inner: SharedContentStore,
    faults: Arc<StoreFaults>,
    masters: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: SharedContentStore, faults: Arc<StoreFaults>) -> Self {
        Self {
            inner,
            faults,
            masters: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ContentStore for FaultyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        if self.faults.list_categories.load(Ordering::SeqCst) {
            return Err(outage("list categories"));
        }
        self.inner.list_categories().await
    }

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError> {
        self.inner.category_by_slug(slug).await
    }

    async fn upsert_category(
        &self,
        slug: &str,
        display_name: &str,
    ) -> Result<Category, StoreError> {
        self.inner.upsert_category(slug, display_name).await
    }

    async fn count_generated(
        &self,
        day: NaiveDate,
        source_language: &str,
    ) -> Result<HashMap<i64, u32>, StoreError> {
        self.inner.count_generated(day, source_language).await
    }

    async fn job_for(&self, day: NaiveDate) -> Result<Option<GenerationJob>, StoreError> {
        self.inner.job_for(day).await
    }

    async fn last_successful_job(&self) -> Result<Option<GenerationJob>, StoreError> {
        self.inner.last_successful_job().await
    }

    async fn ensure_job(&self, day: NaiveDate, target: u32) -> Result<GenerationJob, StoreError> {
        if self.faults.ensure_job.load(Ordering::SeqCst) {
            return Err(outage("ensure job"));
        }
        self.inner.ensure_job(day, target).await
    }

    async fn finalize_job(
        &self,
        day: NaiveDate,
        status: JobStatus,
        error_summary: Option<String>,
        summary: Option<serde_json::Value>,
    ) -> Result<GenerationJob, StoreError> {
        self.inner
            .finalize_job(day, status, error_summary, summary)
            .await
    }

    async fn token_usage(&self, day: NaiveDate) -> Result<TokenUsage, StoreError> {
        self.inner.token_usage(day).await
    }

    async fn find_article(
        &self,
        language: &str,
        slug: &str,
    ) -> Result<Option<ArticleRecord>, StoreError> {
        self.inner.find_article(language, slug).await
    }

    async fn insert_master(
        &self,
        article: NewArticle,
        day: NaiveDate,
        guard: QuotaGuard,
    ) -> Result<InsertOutcome, StoreError> {
        if let Some(allowed) = self.faults.masters_before_outage {
            if self.masters.fetch_add(1, Ordering::SeqCst) >= allowed {
                return Err(outage("insert master"));
            }
        }
        self.inner.insert_master(article, day, guard).await
    }

    async fn insert_translation(
        &self,
        article: NewArticle,
        day: NaiveDate,
    ) -> Result<InsertOutcome, StoreError> {
        self.inner.insert_translation(article, day).await
    }
}

// ============================================================================
// Orchestrator harness
// ============================================================================

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub store: SharedContentStore,
    pub providers: Vec<Arc<ScriptedProvider>>,
}

impl Harness {
    pub fn total_calls(&self) -> usize {
        self.providers.iter().map(|p| p.calls()).sum()
    }
}

/// Builder for an orchestrator over an in-memory store
pub struct HarnessBuilder {
    categories: Vec<(String, String)>,
    providers: Vec<Arc<ScriptedProvider>>,
    daily_target: u32,
    languages: Vec<String>,
    max_attempts: Option<u32>,
    window: (u32, u32),
    min_interval_minutes: u64,
    run_budget: Option<Duration>,
    default_chunk_count: i64,
    faults: Option<Arc<StoreFaults>>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            categories: vec![(String::from("health"), String::from("Health"))],
            providers: Vec::new(),
            daily_target: 2,
            languages: vec![String::from("es"), String::from("fr")],
            max_attempts: None,
            window: (2, 6),
            min_interval_minutes: 360,
            run_budget: None,
            default_chunk_count: 2,
            faults: None,
        }
    }
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categories(mut self, slugs: &[&str]) -> Self {
        self.categories = slugs
            .iter()
            .map(|slug| (slug.to_string(), slug.to_uppercase()))
            .collect();
        self
    }

    pub fn provider(mut self, provider: Arc<ScriptedProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn daily_target(mut self, target: u32) -> Self {
        self.daily_target = target;
        self
    }

    pub fn languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn window(mut self, start_hour: u32, end_hour: u32) -> Self {
        self.window = (start_hour, end_hour);
        self
    }

    pub fn run_budget(mut self, budget: Duration) -> Self {
        self.run_budget = Some(budget);
        self
    }

    /// Route the orchestrator through a [`FaultyStore`]; the harness
    /// keeps the healthy store for assertions
    pub fn faults(mut self, faults: Arc<StoreFaults>) -> Self {
        self.faults = Some(faults);
        self
    }

    pub async fn build(mut self) -> Harness {
        if self.providers.is_empty() {
            self.providers.push(ScriptedProvider::new("alpha"));
        }

        let store: SharedContentStore = Arc::new(SqliteContentStore::in_memory().unwrap());
        for (slug, name) in &self.categories {
            store.upsert_category(slug, name).await.unwrap();
        }

        let handles = self
            .providers
            .iter()
            .map(|p| {
                let provider: Arc<dyn GenerationProvider> = p.clone();
                ProviderHandle::new(format!("{}#0", p.name()), provider, 0, Duration::from_secs(5))
            })
            .collect();
        let ring = CredentialRing::new(handles).unwrap();
        let attempts = self
            .max_attempts
            .unwrap_or(self.providers.len() as u32);
        let prompts = PromptCatalog::new(&HashMap::new(), "en").unwrap();
        let gateway = ProviderGateway::new(
            Arc::new(ring),
            RetryConfig::immediate(attempts),
            Arc::new(prompts),
            TranslationEngine::new(400, 2),
        );

        let settings = OrchestratorSettings {
            daily_target: self.daily_target,
            source_language: String::from("en"),
            target_languages: self.languages,
            web_search: false,
            run_budget: self.run_budget,
            translation_concurrency: 2,
            default_chunk_count: ChunkCount::new(self.default_chunk_count).unwrap(),
        };
        let gate = TimingGate::new(self.window.0, self.window.1, 0, self.min_interval_minutes).unwrap();
        let run_store: SharedContentStore = match self.faults {
            Some(faults) => Arc::new(FaultyStore::new(store.clone(), faults)),
            None => store.clone(),
        };
        let persister = ArticlePersister::new(run_store.clone(), "https://example.org", "en");

        let orchestrator = Orchestrator::new(run_store, Arc::new(gateway), gate, persister, settings);

        Harness {
            orchestrator: Arc::new(orchestrator),
            store,
            providers: self.providers,
        }
    }
}
