//! Run reports and in-flight tracking

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{JobStatus, TokenCounts};
use crate::scheduler::RunTrigger;

/// Longest error summary written to the job row
const ERROR_SUMMARY_MAX_FAILURES: usize = 5;

/// Terminal state of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every planned unit and every language succeeded
    Complete,
    /// At least one master committed, something else failed or was cut
    Partial,
    /// Nothing could be committed, or the store went away
    Error,
    /// Gate closed or quota already met; nothing attempted
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    /// Status written to the job row; skipped runs write nothing
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            Self::Complete => Some(JobStatus::Complete),
            Self::Partial => Some(JobStatus::Partial),
            Self::Error => Some(JobStatus::Error),
            Self::Skipped => None,
        }
    }

    /// Apply the finalization rule to a finished generation loop
    pub fn decide(masters_committed: u32, had_failures: bool, aborted: bool) -> Self {
        if aborted {
            Self::Error
        } else if !had_failures {
            Self::Complete
        } else if masters_committed > 0 {
            Self::Partial
        } else {
            Self::Error
        }
    }
}

/// Per-category outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub category: String,
    pub category_id: i64,
    pub planned: u32,
    pub committed: u32,
    pub duplicates: u32,
    pub translations_committed: u32,
    pub failed: bool,
    /// Another writer met the target first
    pub quota_met_elsewhere: bool,
}

/// Per-language outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LanguageTally {
    pub committed: u32,
    pub duplicates: u32,
    pub failed: u32,
}

/// One failed unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub kind: String,
    pub message: String,
}

impl FailureRecord {
    fn summary_line(&self) -> String {
        match &self.language {
            Some(language) => format!("{}/{}: {}", self.category, language, self.message),
            None => format!("{}: {}", self.category, self.message),
        }
    }
}

/// Everything one run did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub trigger: RunTrigger,
    pub day: NaiveDate,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub categories: Vec<CategoryReport>,
    pub languages: BTreeMap<String, LanguageTally>,
    pub masters_committed: u32,
    pub translations_committed: u32,
    pub duplicates: u32,
    pub failures: Vec<FailureRecord>,
    pub tokens: TokenCounts,
    pub budget_exhausted: bool,
}

impl RunReport {
    pub(crate) fn start(run_id: Uuid, trigger: RunTrigger, day: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            run_id,
            trigger,
            day,
            status: RunStatus::Skipped,
            skip_reason: None,
            error: None,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            categories: Vec::new(),
            languages: BTreeMap::new(),
            masters_committed: 0,
            translations_committed: 0,
            duplicates: 0,
            failures: Vec::new(),
            tokens: TokenCounts::default(),
            budget_exhausted: false,
        }
    }

    pub(crate) fn close(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Utc::now();
        self.duration_ms = (self.finished_at - self.started_at).num_milliseconds().max(0);
    }

    pub(crate) fn language(&mut self, code: &str) -> &mut LanguageTally {
        self.languages.entry(code.to_string()).or_default()
    }

    /// Short text stored as the job's error summary
    pub fn error_summary(&self) -> Option<String> {
        if self.failures.is_empty() && self.error.is_none() && !self.budget_exhausted {
            return None;
        }

        let mut lines: Vec<String> = Vec::new();
        if let Some(error) = &self.error {
            lines.push(error.clone());
        }
        lines.extend(
            self.failures
                .iter()
                .take(ERROR_SUMMARY_MAX_FAILURES)
                .map(FailureRecord::summary_line),
        );
        if self.failures.len() > ERROR_SUMMARY_MAX_FAILURES {
            lines.push(format!(
                "... and {} more",
                self.failures.len() - ERROR_SUMMARY_MAX_FAILURES
            ));
        }
        if self.budget_exhausted {
            lines.push(String::from("run budget exhausted before all units were attempted"));
        }
        Some(lines.join("; "))
    }

    /// Structured summary attached to the job row
    pub fn job_summary(&self) -> serde_json::Value {
        let categories: BTreeMap<&str, serde_json::Value> = self
            .categories
            .iter()
            .map(|c| {
                (
                    c.category.as_str(),
                    serde_json::json!({
                        "planned": c.planned,
                        "committed": c.committed,
                        "duplicates": c.duplicates,
                        "translations": c.translations_committed,
                        "failed": c.failed,
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "run_id": self.run_id,
            "trigger": self.trigger,
            "status": self.status,
            "duration_ms": self.duration_ms,
            "masters_committed": self.masters_committed,
            "translations_committed": self.translations_committed,
            "duplicates": self.duplicates,
            "failures": self.failures.len(),
            "tokens_in": self.tokens.tokens_in,
            "tokens_out": self.tokens.tokens_out,
            "budget_exhausted": self.budget_exhausted,
            "categories": categories,
            "languages": self.languages,
        })
    }
}

// ============================================================================
// In-flight tracking
// ============================================================================

/// Live view of a run that has not finished yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlightRun {
    pub run_id: Uuid,
    pub trigger: RunTrigger,
    pub day: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub planned_units: usize,
    pub planned_articles: u32,
    pub masters_committed: u32,
    pub translations_committed: u32,
    pub failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_category: Option<String>,
}

#[derive(Debug, Default)]
struct TrackerState {
    in_flight: HashMap<Uuid, InFlightRun>,
    last_report: Option<RunReport>,
}

/// Shared between the orchestrator and the status reporter
#[derive(Debug, Default)]
pub struct RunTracker {
    state: RwLock<TrackerState>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn begin(&self, run: InFlightRun) {
        self.state.write().await.in_flight.insert(run.run_id, run);
    }

    pub(crate) async fn update<F>(&self, run_id: Uuid, apply: F)
    where
        F: FnOnce(&mut InFlightRun),
    {
        if let Some(run) = self.state.write().await.in_flight.get_mut(&run_id) {
            apply(run);
        }
    }

    /// Drop the in-flight entry and remember the report
    pub(crate) async fn finish(&self, report: &RunReport) {
        let mut state = self.state.write().await;
        state.in_flight.remove(&report.run_id);
        state.last_report = Some(report.clone());
    }

    pub async fn in_flight(&self) -> Vec<InFlightRun> {
        let mut runs: Vec<InFlightRun> = self.state.read().await.in_flight.values().cloned().collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    pub async fn is_busy(&self) -> bool {
        !self.state.read().await.in_flight.is_empty()
    }

    pub async fn last_report(&self) -> Option<RunReport> {
        self.state.read().await.last_report.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_status_rule() {
        assert_eq!(RunStatus::decide(0, false, false), RunStatus::Complete);
        assert_eq!(RunStatus::decide(3, false, false), RunStatus::Complete);
        assert_eq!(RunStatus::decide(1, true, false), RunStatus::Partial);
        assert_eq!(RunStatus::decide(0, true, false), RunStatus::Error);
        assert_eq!(RunStatus::decide(4, false, true), RunStatus::Error);
        assert_eq!(RunStatus::Skipped.job_status(), None);
        assert_eq!(RunStatus::Partial.job_status(), Some(JobStatus::Partial));
    }

    #[test]
    fn test_error_summary() {
        let mut report = RunReport::start(Uuid::new_v4(), RunTrigger::Manual, day(), Utc::now());
        assert_eq!(report.error_summary(), None);

        for i in 0..7 {
            report.failures.push(FailureRecord {
                category: format!("c{i}"),
                language: (i % 2 == 0).then(|| String::from("es")),
                slug: None,
                kind: String::from("provider_exhausted"),
                message: String::from("all 3 provider attempts failed"),
            });
        }
        let summary = report.error_summary().unwrap();
        assert!(summary.starts_with("c0/es: all 3"));
        assert!(summary.contains("c1: all 3"));
        assert!(summary.ends_with("... and 2 more"));
    }

    #[test]
    fn test_job_summary_shape() {
        let mut report = RunReport::start(Uuid::new_v4(), RunTrigger::Scheduled, day(), Utc::now());
        report.categories.push(CategoryReport {
            category: String::from("health"),
            category_id: 1,
            planned: 2,
            committed: 2,
            ..CategoryReport::default()
        });
        report.language("es").committed += 2;
        report.close(RunStatus::Complete);

        let summary = report.job_summary();
        assert_eq!(summary["status"], "complete");
        assert_eq!(summary["categories"]["health"]["committed"], 2);
        assert_eq!(summary["languages"]["es"]["committed"], 2);
    }

    #[tokio::test]
    async fn test_tracker_lifecycle() {
        let tracker = RunTracker::new();
        let run_id = Uuid::new_v4();
        tracker
            .begin(InFlightRun {
                run_id,
                trigger: RunTrigger::Startup,
                day: day(),
                started_at: Utc::now(),
                planned_units: 2,
                planned_articles: 3,
                masters_committed: 0,
                translations_committed: 0,
                failures: 0,
                current_category: None,
            })
            .await;
        assert!(tracker.is_busy().await);

        tracker.update(run_id, |run| run.masters_committed += 1).await;
        assert_eq!(tracker.in_flight().await[0].masters_committed, 1);

        let mut report = RunReport::start(run_id, RunTrigger::Startup, day(), Utc::now());
        report.close(RunStatus::Complete);
        tracker.finish(&report).await;

        assert!(!tracker.is_busy().await);
        assert_eq!(tracker.last_report().await.unwrap().run_id, run_id);
    }
}
