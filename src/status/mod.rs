//! Health/Status Reporter
//!
//! Read-only summaries for operators. Nothing here writes to the store;
//! in-flight progress comes from the orchestrator's [`RunTracker`], finalized
//! state from the job row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::models::{GenerationJob, TokenUsage};
use crate::orchestrator::{InFlightRun, Orchestrator, RunReport, RunTracker};
use crate::scheduler::{QuotaPlanner, TimingGate};
use crate::storage::{SharedContentStore, StoreError};

/// Liveness summary
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `ok` when the store answered, `degraded` otherwise
    pub status: &'static str,
    pub store_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
    pub job_in_flight: bool,
    pub in_window: bool,
    pub local_hour: u32,
    pub providers: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// One category's progress for the day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryProgress {
    pub slug: String,
    pub display_name: String,
    pub completed: u32,
    pub remaining: u32,
    pub target: u32,
}

/// Today's progress against target
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub day: NaiveDate,
    pub daily_target: u32,
    pub categories: Vec<CategoryProgress>,
    pub completed: u32,
    pub remaining: u32,
    /// Finalized or pending job row; never a half-written state
    pub job: Option<GenerationJob>,
    pub tokens: TokenUsage,
    pub in_flight: Vec<InFlightRun>,
    pub last_run: Option<RunReport>,
}

/// Builds health and progress reports
#[derive(Clone)]
pub struct StatusReporter {
    store: SharedContentStore,
    planner: QuotaPlanner,
    gate: TimingGate,
    tracker: Arc<RunTracker>,
    providers: Vec<String>,
    daily_target: u32,
}

impl StatusReporter {
    pub fn new(
        store: SharedContentStore,
        planner: QuotaPlanner,
        gate: TimingGate,
        tracker: Arc<RunTracker>,
        providers: Vec<String>,
        daily_target: u32,
    ) -> Self {
        Self {
            store,
            planner,
            gate,
            tracker,
            providers,
            daily_target,
        }
    }

    /// Reporter sharing the orchestrator's store, gate and tracker
    pub fn for_orchestrator(orchestrator: &Orchestrator) -> Self {
        Self::new(
            orchestrator.store().clone(),
            orchestrator.planner().clone(),
            orchestrator.gate().clone(),
            orchestrator.tracker(),
            orchestrator
                .gateway()
                .ring()
                .labels()
                .into_iter()
                .map(String::from)
                .collect(),
            orchestrator.settings().daily_target,
        )
    }

    /// Store reachability, in-flight state and window position
    pub async fn health(&self, now: DateTime<Utc>) -> HealthReport {
        let (store_ok, store_error) = match self.store.ping().await {
            Ok(()) => (true, None),
            Err(e) => {
                warn!(error = %e, "Health check could not reach the store");
                (false, Some(e.to_string()))
            }
        };

        HealthReport {
            status: if store_ok { "ok" } else { "degraded" },
            store_ok,
            store_error,
            job_in_flight: self.tracker.is_busy().await,
            in_window: self.gate.is_within_window(now),
            local_hour: self.gate.local_hour(now),
            providers: self.providers.clone(),
            checked_at: now,
        }
    }

    /// Per-category completed and remaining counts for the day `now` is in
    pub async fn today(&self, now: DateTime<Utc>) -> Result<ProgressReport, StoreError> {
        let day = self.gate.local_date(now);
        self.progress_for(day).await
    }

    pub async fn progress_for(&self, day: NaiveDate) -> Result<ProgressReport, StoreError> {
        let categories = self.store.list_categories().await?;
        let generated = self.planner.progress(day).await?;
        let job = self.store.job_for(day).await?;
        let tokens = self.store.token_usage(day).await?;

        let categories: Vec<CategoryProgress> = categories
            .into_iter()
            .map(|category| {
                let completed = generated.get(&category.id).copied().unwrap_or(0);
                CategoryProgress {
                    remaining: self.daily_target.saturating_sub(completed),
                    completed,
                    target: self.daily_target,
                    slug: category.slug,
                    display_name: category.display_name,
                }
            })
            .collect();

        Ok(ProgressReport {
            day,
            daily_target: self.daily_target,
            completed: categories.iter().map(|c| c.completed).sum(),
            remaining: categories.iter().map(|c| c.remaining).sum(),
            categories,
            job,
            tokens,
            in_flight: self.tracker.in_flight().await,
            last_run: self.tracker.last_report().await,
        })
    }
}
