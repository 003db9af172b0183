//! End-to-end runs over an in-memory store and scripted providers

mod common;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use common::{now, today, HarnessBuilder, Reply, ScriptedProvider, StoreFaults, CALL_TOKENS};
use dailyquill::error::{Error, GenerationError};
use dailyquill::models::{JobStatus, TokenCounts};
use dailyquill::orchestrator::RunStatus;
use dailyquill::scheduler::RunTrigger;
use dailyquill::storage::{InsertOutcome, Provenance, QuotaGuard};

fn provenance() -> Provenance {
    Provenance {
        model: String::from("m"),
        prompt: String::from("p"),
        tokens: TokenCounts::new(10, 90),
    }
}

// ============================================================================
// Planning
// ============================================================================

#[tokio::test]
async fn test_deficit_shrinks_after_one_master() {
    let harness = HarnessBuilder::new().daily_target(2).languages(&[]).build().await;
    let planner = harness.orchestrator.planner();

    let plan = planner.plan(today(), 2).await.unwrap();
    assert_eq!(plan.units.len(), 1);
    assert_eq!(plan.units[0].deficit, 2);

    let generated = harness
        .orchestrator
        .manual_generate(Some("health"), None, now())
        .await
        .unwrap();
    assert_eq!(generated.outcome, "inserted");

    let plan = planner.plan(today(), 2).await.unwrap();
    assert_eq!(plan.units.len(), 1);
    assert_eq!(plan.units[0].deficit, 1);
}

// ============================================================================
// Full runs
// ============================================================================

#[tokio::test]
async fn test_scheduled_run_completes_and_meets_quota() {
    let harness = HarnessBuilder::new()
        .daily_target(2)
        .languages(&["es", "fr"])
        .build()
        .await;

    let report = harness.orchestrator.run(RunTrigger::Scheduled, now()).await;

    assert_eq!(report.status, RunStatus::Complete, "{:?}", report.failures);
    assert_eq!(report.masters_committed, 2);
    assert_eq!(report.translations_committed, 4);
    assert!(report.failures.is_empty());
    assert_eq!(report.languages["es"].committed, 2);

    let job = harness.store.job_for(today()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.generated_count, 2);
    assert_eq!(job.target_count, 2);

    // Ledger matches what the run accounted for, at least one call per article
    let usage = harness.store.token_usage(today()).await.unwrap();
    assert_eq!(usage.total(), report.tokens.total());
    assert!(usage.total() >= 6 * CALL_TOKENS.total());

    let master = &report.categories[0];
    assert_eq!(master.committed, 2);
    assert_eq!(master.translations_committed, 4);

    let again = harness.orchestrator.run(RunTrigger::Manual, now()).await;
    assert_eq!(again.status, RunStatus::Skipped);
    assert_eq!(again.skip_reason.as_deref(), Some("quota already met"));
}

#[tokio::test]
async fn test_translations_are_linked_to_master() {
    let harness = HarnessBuilder::new()
        .daily_target(1)
        .languages(&["es"])
        .build()
        .await;

    let report = harness.orchestrator.run(RunTrigger::Manual, now()).await;
    assert_eq!(report.status, RunStatus::Complete);

    let master = harness
        .store
        .find_article("en", "alpha-article-1")
        .await
        .unwrap()
        .unwrap();
    let translation = harness
        .store
        .find_article("es", "alpha-article-1-es")
        .await
        .unwrap()
        .unwrap();

    assert!(master.is_master());
    assert_eq!(translation.master_slug.as_deref(), Some("alpha-article-1"));
    assert_eq!(translation.category_id, master.category_id);
    assert_eq!(translation.canonical_url, "https://example.org/es/alpha-article-1-es");
    assert!(translation.ai_prompt.starts_with("translate en -> es in"));
}

#[tokio::test]
async fn test_unit_failure_gives_partial_status() {
    // First master parses, the second is garbage with a single attempt
    let provider = ScriptedProvider::with_script("alpha", vec![Reply::Default, Reply::Garbage]);
    let harness = HarnessBuilder::new()
        .categories(&["health", "travel"])
        .daily_target(1)
        .languages(&[])
        .provider(provider)
        .max_attempts(1)
        .build()
        .await;

    let report = harness.orchestrator.run(RunTrigger::Manual, now()).await;

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.masters_committed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, "parse_failure");

    let job = harness.store.job_for(today()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Partial);
    assert_eq!(job.generated_count, 1);
    assert!(job.error_summary.is_some());
}

#[tokio::test]
async fn test_nothing_committed_gives_error_status() {
    let provider = ScriptedProvider::with_script(
        "alpha",
        vec![Reply::ServerError, Reply::ServerError, Reply::ServerError],
    );
    let harness = HarnessBuilder::new()
        .categories(&["health", "travel"])
        .daily_target(1)
        .languages(&[])
        .provider(provider)
        .max_attempts(1)
        .build()
        .await;

    let report = harness.orchestrator.run(RunTrigger::Manual, now()).await;

    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.masters_committed, 0);
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| f.kind == "provider_exhausted"));

    let job = harness.store.job_for(today()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.generated_count, 0);
}

#[tokio::test]
async fn test_scheduled_run_outside_window_is_skipped() {
    let harness = HarnessBuilder::new().window(2, 6).build().await;
    let noon = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    let report = harness.orchestrator.run(RunTrigger::Scheduled, noon).await;

    assert_eq!(report.status, RunStatus::Skipped);
    assert!(report.skip_reason.unwrap().contains("outside window"));
    assert_eq!(harness.total_calls(), 0);
    assert!(harness.store.job_for(today()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_manual_run_ignores_window() {
    let harness = HarnessBuilder::new()
        .window(2, 6)
        .daily_target(1)
        .languages(&[])
        .build()
        .await;
    let noon = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    let report = harness.orchestrator.run(RunTrigger::Manual, noon).await;
    assert_eq!(report.status, RunStatus::Complete);
    assert_eq!(report.masters_committed, 1);
}

#[tokio::test]
async fn test_startup_run_too_soon_after_success() {
    let harness = HarnessBuilder::new()
        .categories(&["health", "travel"])
        .daily_target(1)
        .languages(&[])
        .build()
        .await;

    // Commit work for yesterday so a successful job exists
    let yesterday = now() - ChronoDuration::days(1);
    let first = harness.orchestrator.run(RunTrigger::Manual, yesterday).await;
    assert_eq!(first.status, RunStatus::Complete);
    let calls = harness.total_calls();

    // The job's timestamp comes from the wall clock, which is always
    // within the interval of a run started right now
    let report = harness.orchestrator.run(RunTrigger::Startup, Utc::now()).await;
    assert_eq!(report.status, RunStatus::Skipped);
    assert!(report.skip_reason.unwrap().contains("too soon"));
    assert_eq!(harness.total_calls(), calls);
}

#[tokio::test]
async fn test_exhausted_budget_stops_run() {
    let harness = HarnessBuilder::new()
        .daily_target(3)
        .languages(&[])
        .run_budget(Duration::ZERO)
        .build()
        .await;

    let report = harness.orchestrator.run(RunTrigger::Manual, now()).await;

    assert!(report.budget_exhausted);
    assert_eq!(report.masters_committed, 0);
    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(harness.total_calls(), 0);
}

#[tokio::test]
async fn test_tracker_holds_last_report() {
    let harness = HarnessBuilder::new().daily_target(1).languages(&[]).build().await;
    let report = harness.orchestrator.run(RunTrigger::Manual, now()).await;

    let tracker = harness.orchestrator.tracker();
    assert!(!tracker.is_busy().await);
    assert_eq!(tracker.last_report().await.unwrap().run_id, report.run_id);
}

#[tokio::test]
async fn test_runs_can_be_spawned() {
    fn assert_send<T: Send>(_: &T) {}

    let harness = HarnessBuilder::new().languages(&["es"]).build().await;
    let orchestrator = &harness.orchestrator;
    assert_send(&orchestrator.run(RunTrigger::Manual, now()));
    assert_send(&orchestrator.manual_generate(None, None, now()));
    assert_send(&orchestrator.manual_translate("missing", "es", None, now()));

    let spawned = Arc::clone(&harness.orchestrator);
    let report = tokio::spawn(async move { spawned.run(RunTrigger::Manual, now()).await })
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Complete);
    assert_eq!(report.translations_committed, 2);

    let spawned = Arc::clone(&harness.orchestrator);
    let slug = String::from("alpha-article-1");
    let language = String::from("es");
    let err = tokio::spawn(async move {
        spawned
            .manual_translate(&slug, &language, None, now())
            .await
            .unwrap_err()
    })
    .await
    .unwrap();
    assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
}

// ============================================================================
// Rotation
// ============================================================================

#[tokio::test]
async fn test_timeout_on_first_credential_then_success() {
    let alpha = ScriptedProvider::with_script("alpha", vec![Reply::Timeout]);
    let beta = ScriptedProvider::new("beta");
    let harness = HarnessBuilder::new()
        .provider(alpha.clone())
        .provider(beta.clone())
        .languages(&[])
        .build()
        .await;

    let result = harness
        .orchestrator
        .manual_generate(Some("health"), None, now())
        .await
        .unwrap();

    assert_eq!(result.attempts, 2);
    assert_eq!(result.provider_used, "beta#0");
    assert_eq!(alpha.calls(), 1);
    assert_eq!(beta.calls(), 1);

    // Only the successful call is accounted for on the row
    let stored = harness
        .store
        .find_article("en", &result.article.slug)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.ai_model, beta.model());
    assert_eq!(stored.tokens_in, CALL_TOKENS.tokens_in);
    assert_eq!(stored.tokens_out, CALL_TOKENS.tokens_out);
}

// ============================================================================
// Manual translation
// ============================================================================

#[tokio::test]
async fn test_translate_missing_master_is_not_found() {
    let harness = HarnessBuilder::new().build().await;

    let err = harness
        .orchestrator
        .manual_translate("does-not-exist", "es", None, now())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)), "{err:?}");
    assert_eq!(harness.total_calls(), 0);
    assert!(harness.store.job_for(today()).await.unwrap().is_none());
    assert!(harness.store.token_usage(today()).await.unwrap().total() == 0);
}

#[tokio::test]
async fn test_translate_existing_language_is_conflict() {
    let harness = HarnessBuilder::new().languages(&[]).build().await;
    let master = harness
        .orchestrator
        .manual_generate(Some("health"), None, now())
        .await
        .unwrap();
    let slug = master.article.slug.clone();

    let first = harness
        .orchestrator
        .manual_translate(&slug, "es", Some(3), now())
        .await
        .unwrap();
    assert_eq!(first.article.slug, format!("{slug}-es"));
    assert_eq!(first.chunk_count, 3);
    assert!(!first.used_fallback);

    let calls = harness.total_calls();
    let usage = harness.store.token_usage(today()).await.unwrap();

    let err = harness
        .orchestrator
        .manual_translate(&slug, "ES", None, now())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conflict(_)), "{err:?}");
    assert_eq!(harness.total_calls(), calls);
    assert_eq!(harness.store.token_usage(today()).await.unwrap(), usage);
}

#[tokio::test]
async fn test_out_of_range_chunk_count_fails_before_provider_call() {
    let harness = HarnessBuilder::new().build().await;

    for value in [15, -1, 11] {
        let err = harness
            .orchestrator
            .manual_translate("any-slug", "es", Some(value), now())
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                Error::Generation(GenerationError::InvalidChunkCount { value: v }) if v == value
            ),
            "{err:?}"
        );
    }
    assert_eq!(harness.total_calls(), 0);
}

#[tokio::test]
async fn test_translate_into_source_language_is_rejected() {
    let harness = HarnessBuilder::new().build().await;
    let err = harness
        .orchestrator
        .manual_translate("any-slug", "en", None, now())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_manual_generate_unknown_category() {
    let harness = HarnessBuilder::new().build().await;
    let err = harness
        .orchestrator
        .manual_generate(Some("gardening"), None, now())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(harness.total_calls(), 0);
}

// ============================================================================
// Persistence guarantees
// ============================================================================

#[tokio::test]
async fn test_same_master_twice_counts_once() {
    let harness = HarnessBuilder::new().build().await;
    let store = &harness.store;
    let category = store.category_by_slug("health").await.unwrap().unwrap();
    let persister = dailyquill::storage::ArticlePersister::new(
        store.clone(),
        "https://example.org",
        "en",
    );
    let doc = common::article("Repeated Title");

    let first = persister
        .persist_master(&doc, &category, &provenance(), today(), QuotaGuard::none())
        .await
        .unwrap();
    let second = persister
        .persist_master(&doc, &category, &provenance(), today(), QuotaGuard::none())
        .await
        .unwrap();

    assert!(first.is_inserted());
    assert!(matches!(second, InsertOutcome::Duplicate(_)));

    let job = store.job_for(today()).await.unwrap().unwrap();
    assert_eq!(job.generated_count, 1);
    assert_eq!(store.token_usage(today()).await.unwrap().total(), 100);
}

#[tokio::test]
async fn test_quota_guard_bounds_overshoot() {
    let harness = HarnessBuilder::new().build().await;
    let store = &harness.store;
    let category = store.category_by_slug("health").await.unwrap().unwrap();
    let persister = dailyquill::storage::ArticlePersister::new(
        store.clone(),
        "https://example.org",
        "en",
    );

    let guard = QuotaGuard::target(1);
    let first = persister
        .persist_master(&common::article("One"), &category, &provenance(), today(), guard)
        .await
        .unwrap();
    let second = persister
        .persist_master(&common::article("Two"), &category, &provenance(), today(), guard)
        .await
        .unwrap();

    assert!(first.is_inserted());
    assert!(matches!(second, InsertOutcome::QuotaMet));
    assert_eq!(
        store.job_for(today()).await.unwrap().unwrap().generated_count,
        1
    );
}

// ============================================================================
// Store outages
// ============================================================================

#[tokio::test]
async fn test_store_outage_while_planning_is_error() {
    let harness = HarnessBuilder::new()
        .faults(StoreFaults::planning())
        .build()
        .await;

    let report = harness.orchestrator.run(RunTrigger::Manual, now()).await;

    assert_eq!(report.status, RunStatus::Error);
    assert!(report.error.as_deref().unwrap().contains("planning failed"));
    assert_eq!(harness.total_calls(), 0);
    assert!(harness.store.job_for(today()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_outage_opening_job_is_error() {
    let harness = HarnessBuilder::new()
        .faults(StoreFaults::job_setup())
        .build()
        .await;

    let report = harness.orchestrator.run(RunTrigger::Manual, now()).await;

    assert_eq!(report.status, RunStatus::Error);
    assert!(report.error.as_deref().unwrap().contains("job setup failed"));
    assert_eq!(harness.total_calls(), 0);
    assert!(harness.store.job_for(today()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_outage_mid_run_aborts_and_keeps_commits() {
    let harness = HarnessBuilder::new()
        .categories(&["health", "travel"])
        .daily_target(3)
        .languages(&[])
        .faults(StoreFaults::after_masters(1))
        .build()
        .await;

    let report = harness.orchestrator.run(RunTrigger::Manual, now()).await;

    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.masters_committed, 1);
    assert!(report.error.as_deref().unwrap().contains("store unavailable"));
    // The outage stops the run instead of moving on to the next category
    assert_eq!(report.categories.len(), 1);
    assert_eq!(harness.providers[0].masters_served(), 2);

    let job = harness.store.job_for(today()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.generated_count, 1);
    assert!(harness
        .store
        .find_article("en", "alpha-article-1")
        .await
        .unwrap()
        .is_some());
}
