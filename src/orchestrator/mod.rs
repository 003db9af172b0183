//! Daily/startup runner
//!
//! One run walks this state machine:
//!
//! ```text
//! Start ──gate closed──▶ Skipped
//!   │
//!   ▼
//! Planning ──store error──▶ Error
//!   │      ──no deficits──▶ Skipped
//!   ▼
//! Generating  (per category, sequential)
//!   │   master ─▶ persist ─▶ translations (concurrent per language)
//!   ▼
//! Finalizing ──▶ Complete | Partial | Error
//! ```
//!
//! Every article is its own transaction, so a failure in one category never
//! rolls back another category's committed work. Overlapping runs are not
//! excluded; the per-insert quota re-check bounds their overshoot.

mod manual;
mod report;

pub use manual::{ManualGeneration, ManualTranslation};
pub use report::{
    CategoryReport, FailureRecord, InFlightRun, LanguageTally, RunReport, RunStatus, RunTracker,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::document::ArticleDocument;
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::{ArticleRecord, Category, TokenCounts};
use crate::prompts::PromptCatalog;
use crate::provider::{
    build_handles, CredentialRing, GenerationError, MasterOptions, ProviderGateway,
};
use crate::publish::{spawn_notify, PublicationHook, WebhookHook};
use crate::scheduler::{GateDecision, QuotaPlanner, RunHandler, RunTrigger, TimingGate};
use crate::storage::{
    ArticlePersister, InsertOutcome, Provenance, QuotaGuard, SharedContentStore, StoreError,
};
use crate::translation::{ChunkCount, TranslationEngine};
use crate::utils::retry::RetryConfig;
use crate::utils::translation_slug;

// ============================================================================
// Settings
// ============================================================================

/// Run parameters taken from configuration
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub daily_target: u32,
    pub source_language: String,
    /// Never contains the source language
    pub target_languages: Vec<String>,
    pub web_search: bool,
    pub run_budget: Option<Duration>,
    /// Languages translated concurrently for one master
    pub translation_concurrency: usize,
    pub default_chunk_count: ChunkCount,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> std::result::Result<Self, GenerationError> {
        let generation = &config.generation;
        let source = generation.source_language.to_ascii_lowercase();
        let target_languages = generation
            .target_languages
            .iter()
            .map(|l| l.to_ascii_lowercase())
            .filter(|l| *l != source)
            .collect();

        Ok(Self {
            daily_target: generation.daily_target_per_category,
            source_language: source,
            target_languages,
            web_search: generation.web_search,
            run_budget: config.run_budget(),
            translation_concurrency: generation.translation_concurrency.max(1),
            default_chunk_count: ChunkCount::new(config.translation.default_chunk_count)?,
        })
    }
}

/// What the generation loop should do after one master attempt
enum Step {
    Continue,
    NextCategory,
    Abort(StoreError),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Composes the planner, gate, gateway and persister into runs
pub struct Orchestrator {
    store: SharedContentStore,
    planner: QuotaPlanner,
    gate: TimingGate,
    gateway: Arc<ProviderGateway>,
    persister: ArticlePersister,
    hook: Option<Arc<dyn PublicationHook>>,
    tracker: Arc<RunTracker>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: SharedContentStore,
        gateway: Arc<ProviderGateway>,
        gate: TimingGate,
        persister: ArticlePersister,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            planner: QuotaPlanner::new(store.clone(), settings.source_language.clone()),
            store,
            gate,
            gateway,
            persister,
            hook: None,
            tracker: Arc::new(RunTracker::new()),
            settings,
        }
    }

    /// Wire every collaborator from configuration
    pub fn from_config(config: &Config, store: SharedContentStore) -> Result<Self> {
        let handles = build_handles(&config.providers)?;
        let mut ring = CredentialRing::new(handles)?;
        if config.rotation.seed_by_date {
            ring = ring.seeded_for(Utc::now().date_naive());
        }

        let retry = RetryConfig::with_delays(
            config.effective_max_attempts(),
            config.rotation.base_delay_ms,
            config.rotation.max_delay_ms,
        );
        let prompts = PromptCatalog::new(&config.prompts, config.generation.source_language.clone())
            .map_err(|e| Error::config(format!("invalid prompt template: {e}")))?;
        let engine = TranslationEngine::new(
            config.translation.max_chunk_chars,
            config.translation.chunk_concurrency,
        );
        let gateway = ProviderGateway::new(Arc::new(ring), retry, Arc::new(prompts), engine);

        let settings = OrchestratorSettings::from_config(config)?;
        let gate = TimingGate::from_config(&config.window)?;
        let persister = ArticlePersister::new(
            store.clone(),
            config.site.base_url.clone(),
            settings.source_language.clone(),
        );

        let mut orchestrator = Self::new(store, Arc::new(gateway), gate, persister, settings);
        if let Some(url) = &config.publish.webhook_url {
            let hook = WebhookHook::new(url.clone(), config.publish_timeout())
                .map_err(|e| Error::config(e.to_string()))?;
            orchestrator = orchestrator.with_hook(Arc::new(hook));
        }
        Ok(orchestrator)
    }

    pub fn with_hook(mut self, hook: Arc<dyn PublicationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn store(&self) -> &SharedContentStore {
        &self.store
    }

    pub fn gate(&self) -> &TimingGate {
        &self.gate
    }

    pub fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    pub fn planner(&self) -> &QuotaPlanner {
        &self.planner
    }

    pub fn tracker(&self) -> Arc<RunTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Calendar day `now` belongs to
    pub fn day_for(&self, now: DateTime<Utc>) -> NaiveDate {
        self.gate.local_date(now)
    }

    /// Execute one full run and return its report
    pub fn run(&self, trigger: RunTrigger, now: DateTime<Utc>) -> BoxFuture<'_, RunReport> {
        self.run_with_id(Uuid::new_v4(), trigger, now)
    }

    /// Same as [`Orchestrator::run`] with a caller-chosen run id
    pub fn run_with_id(
        &self,
        run_id: Uuid,
        trigger: RunTrigger,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, RunReport> {
        let day = self.day_for(now);
        let span = info_span!("run", run_id = %run_id, trigger = %trigger, day = %day);
        self.execute(run_id, trigger, day, now).instrument(span).boxed()
    }

    async fn execute(
        &self,
        run_id: Uuid,
        trigger: RunTrigger,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> RunReport {
        let timer = metrics::start_run_timer(trigger.as_str());
        let mut report = RunReport::start(run_id, trigger, day, now);

        match self.check_gate(trigger, now).await {
            Ok(decision) if decision.is_open() => {}
            Ok(decision) => {
                info!(reason = %decision.reason(), "Run skipped by timing gate");
                report.skip_reason = Some(decision.reason());
                return self.conclude(report, RunStatus::Skipped, timer);
            }
            Err(e) => {
                error!(error = %e, "Could not read last successful job");
                report.error = Some(e.to_string());
                return self.conclude(report, RunStatus::Error, timer);
            }
        }

        let plan = match self.planner.plan(day, self.settings.daily_target).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "Planning failed");
                report.error = Some(format!("planning failed: {e}"));
                return self.conclude(report, RunStatus::Error, timer);
            }
        };

        if plan.is_empty() {
            info!(categories = plan.total_categories, "Quota already met");
            report.skip_reason = Some(String::from("quota already met"));
            return self.conclude(report, RunStatus::Skipped, timer);
        }

        if let Err(e) = self.store.ensure_job(day, plan.job_target()).await {
            error!(error = %e, "Could not open the day's job");
            report.error = Some(format!("job setup failed: {e}"));
            return self.conclude(report, RunStatus::Error, timer);
        }

        info!(
            units = plan.units.len(),
            articles = plan.total_deficit(),
            languages = self.settings.target_languages.len(),
            "Run started"
        );

        self.tracker
            .begin(InFlightRun {
                run_id,
                trigger,
                day,
                started_at: now,
                planned_units: plan.units.len(),
                planned_articles: plan.total_deficit(),
                masters_committed: 0,
                translations_committed: 0,
                failures: 0,
                current_category: None,
            })
            .await;
        metrics::set_run_in_flight(true);

        let deadline = self.settings.run_budget.map(|budget| Instant::now() + budget);
        let mut aborted: Option<StoreError> = None;

        'units: for unit in &plan.units {
            let category = &unit.category;
            let mut tally = CategoryReport {
                category: category.slug.clone(),
                category_id: category.id,
                planned: unit.deficit,
                ..CategoryReport::default()
            };
            let slug = category.slug.clone();
            self.tracker
                .update(run_id, move |run| run.current_category = Some(slug))
                .await;

            for _ in 0..unit.deficit {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    warn!(category = %category.slug, "Run budget exhausted, remaining units skipped");
                    report.budget_exhausted = true;
                    report.categories.push(tally);
                    break 'units;
                }

                match self.produce(category, day, run_id, &mut report, &mut tally).await {
                    Step::Continue => {}
                    Step::NextCategory => break,
                    Step::Abort(e) => {
                        report.categories.push(tally);
                        aborted = Some(e);
                        break 'units;
                    }
                }
            }
            report.categories.push(tally);
        }

        let status = RunStatus::decide(
            report.masters_committed,
            !report.failures.is_empty() || report.budget_exhausted,
            aborted.is_some(),
        );
        if let Some(e) = aborted {
            error!(error = %e, "Store unavailable, run aborted");
            report.error = Some(format!("store unavailable: {e}"));
        }

        let status = self.finalize(day, &mut report, status).await;
        self.tracker.finish(&report).await;
        metrics::set_run_in_flight(false);
        self.conclude(report, status, timer)
    }

    /// Gate check by trigger kind; manual runs are always let through
    async fn check_gate(
        &self,
        trigger: RunTrigger,
        now: DateTime<Utc>,
    ) -> std::result::Result<GateDecision, StoreError> {
        match trigger {
            RunTrigger::Manual => Ok(GateDecision::Open),
            RunTrigger::Scheduled => {
                if !self.gate.is_within_window(now) {
                    return Ok(self.gate.check(now, None));
                }
                let last = self.last_success().await?;
                Ok(self.gate.check(now, last))
            }
            RunTrigger::Startup => {
                let last = self.last_success().await?;
                Ok(self.gate.check_interval(now, last))
            }
        }
    }

    async fn last_success(&self) -> std::result::Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .store
            .last_successful_job()
            .await?
            .map(|job| job.updated_at))
    }

    /// Generate, persist and translate one master article
    async fn produce(
        &self,
        category: &Category,
        day: NaiveDate,
        run_id: Uuid,
        report: &mut RunReport,
        tally: &mut CategoryReport,
    ) -> Step {
        let options = MasterOptions {
            prefer_web_search: self.settings.web_search,
        };
        let generated = match self.gateway.generate_master(category, options).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!(category = %category.slug, error = %e, "Master generation failed");
                tally.failed = true;
                self.record_failure(report, run_id, &category.slug, None, None, Error::from(e))
                    .await;
                return Step::NextCategory;
            }
        };

        let provenance = Provenance {
            model: generated.model.clone(),
            prompt: generated.prompt.clone(),
            tokens: generated.tokens,
        };
        let guard = QuotaGuard::target(self.settings.daily_target);
        let outcome = match self
            .persister
            .persist_master(&generated.doc, category, &provenance, day, guard)
            .await
        {
            Ok(outcome) => outcome,
            Err(e @ StoreError::Unavailable(_)) => return Step::Abort(e),
            Err(e) => {
                warn!(category = %category.slug, error = %e, "Master persistence failed");
                tally.failed = true;
                self.record_failure(report, run_id, &category.slug, None, None, Error::from(e))
                    .await;
                return Step::NextCategory;
            }
        };

        match outcome {
            InsertOutcome::Inserted(master) => {
                tally.committed += 1;
                report.masters_committed += 1;
                report.tokens += record_tokens(&master);
                report.language(&self.settings.source_language).committed += 1;
                self.tracker
                    .update(run_id, |run| run.masters_committed += 1)
                    .await;
                self.notify(&master);

                self.translate_all(&generated.doc, &master, day, run_id, report, tally)
                    .await
            }
            InsertOutcome::Duplicate(_) => {
                tally.duplicates += 1;
                report.duplicates += 1;
                report.language(&self.settings.source_language).duplicates += 1;
                Step::Continue
            }
            InsertOutcome::QuotaMet => {
                info!(category = %category.slug, "Target met by another run");
                tally.quota_met_elsewhere = true;
                Step::NextCategory
            }
        }
    }

    /// Translate a committed master into every target language
    async fn translate_all(
        &self,
        doc: &ArticleDocument,
        master: &ArticleRecord,
        day: NaiveDate,
        run_id: Uuid,
        report: &mut RunReport,
        tally: &mut CategoryReport,
    ) -> Step {
        let semaphore = Semaphore::new(self.settings.translation_concurrency.max(1));
        let chunk_count = self.settings.default_chunk_count;

        let mut pending = Vec::with_capacity(self.settings.target_languages.len());
        for language in &self.settings.target_languages {
            let semaphore = &semaphore;
            pending.push(async move {
                // The semaphore lives for this call and is never closed
                let _permit = semaphore.acquire().await.ok();
                let result = self
                    .translate_one(doc, master, language, day, chunk_count)
                    .await;
                (language, result)
            });
        }
        let results: Vec<(&String, Result<InsertOutcome>)> = join_all(pending).await;

        let mut abort = None;
        for (language, result) in results {
            match result {
                Ok(InsertOutcome::Inserted(record)) => {
                    tally.translations_committed += 1;
                    report.translations_committed += 1;
                    report.tokens += record_tokens(&record);
                    report.language(language).committed += 1;
                    self.tracker
                        .update(run_id, |run| run.translations_committed += 1)
                        .await;
                    self.notify(&record);
                }
                Ok(InsertOutcome::Duplicate(_)) => {
                    report.duplicates += 1;
                    report.language(language).duplicates += 1;
                }
                Ok(InsertOutcome::QuotaMet) => {}
                Err(Error::Store(e @ StoreError::Unavailable(_))) => abort = Some(e),
                Err(e) => {
                    warn!(
                        master = %master.slug,
                        language = %language,
                        error = %e,
                        "Translation failed"
                    );
                    report.language(language).failed += 1;
                    self.record_failure(
                        report,
                        run_id,
                        &tally.category,
                        Some(language.clone()),
                        Some(translation_slug(&master.slug, language)),
                        e,
                    )
                    .await;
                }
            }
        }

        match abort {
            Some(e) => Step::Abort(e),
            None => Step::Continue,
        }
    }

    /// Translate and persist one language; an existing translation
    /// short-circuits before any provider call
    async fn translate_one(
        &self,
        doc: &ArticleDocument,
        master: &ArticleRecord,
        language: &str,
        day: NaiveDate,
        chunk_count: ChunkCount,
    ) -> Result<InsertOutcome> {
        let slug = translation_slug(&master.slug, language);
        if let Some(existing) = self.store.find_article(language, &slug).await? {
            return Ok(InsertOutcome::Duplicate(existing));
        }

        let translated = self
            .gateway
            .generate_translation(language, doc, chunk_count)
            .await?;
        info!(
            master = %master.slug,
            language = %language,
            chunks = translated.chunks,
            attempts = translated.attempts,
            fallback = translated.used_fallback,
            "Translation generated"
        );

        let provenance = Provenance {
            model: translated.model.clone(),
            prompt: translation_provenance(&self.settings.source_language, language, translated.chunks),
            tokens: translated.tokens,
        };
        let outcome = self
            .persister
            .persist_translation(&translated.doc, master, language, &provenance, day)
            .await?;
        Ok(outcome)
    }

    async fn record_failure(
        &self,
        report: &mut RunReport,
        run_id: Uuid,
        category: &str,
        language: Option<String>,
        slug: Option<String>,
        err: Error,
    ) {
        report.failures.push(FailureRecord {
            category: category.to_string(),
            language,
            slug,
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
        self.tracker.update(run_id, |run| run.failures += 1).await;
    }

    /// Write the terminal status; a failed write turns the run into an error
    async fn finalize(&self, day: NaiveDate, report: &mut RunReport, status: RunStatus) -> RunStatus {
        let Some(job_status) = status.job_status() else {
            return status;
        };

        report.close(status);
        let result = self
            .store
            .finalize_job(day, job_status, report.error_summary(), Some(report.job_summary()))
            .await;

        match result {
            Ok(job) => {
                info!(
                    status = %job.status,
                    generated = job.generated_count,
                    target = job.target_count,
                    "Job finalized"
                );
                status
            }
            Err(e) => {
                error!(error = %e, "Job finalization failed");
                report.error = Some(format!("finalization failed: {e}"));
                RunStatus::Error
            }
        }
    }

    fn conclude(
        &self,
        mut report: RunReport,
        status: RunStatus,
        timer: metrics::MetricsTimer,
    ) -> RunReport {
        report.close(status);
        drop(timer);
        metrics::record_run(report.trigger.as_str(), status.as_str());
        info!(
            status = status.as_str(),
            masters = report.masters_committed,
            translations = report.translations_committed,
            duplicates = report.duplicates,
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "Run finished"
        );
        report
    }

    fn notify(&self, article: &ArticleRecord) {
        if let Some(hook) = &self.hook {
            spawn_notify(Arc::clone(hook), article.clone());
        }
    }
}

#[async_trait]
impl RunHandler for Orchestrator {
    async fn handle(&self, trigger: RunTrigger) {
        let report = self.run(trigger, Utc::now()).await;
        if report.status == RunStatus::Error {
            warn!(
                run_id = %report.run_id,
                error = report.error.as_deref().unwrap_or("unit failures"),
                "Run ended in error"
            );
        }
    }
}

fn record_tokens(record: &ArticleRecord) -> TokenCounts {
    TokenCounts::new(record.tokens_in, record.tokens_out)
}

fn translation_provenance(source: &str, target: &str, chunks: usize) -> String {
    format!("translate {source} -> {target} in {chunks} chunk(s)")
}
