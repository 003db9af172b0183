//! Quota planning: which categories still need master articles today

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::models::Category;
use crate::storage::{SharedContentStore, StoreError};

/// One category's shortfall for the day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUnit {
    pub category: Category,
    /// Master articles still needed
    pub deficit: u32,
    /// Position in the plan, 0 = first
    pub priority: usize,
}

/// Order categories by shortfall
///
/// Categories at or above target are dropped. Larger deficits come first and
/// ties go to the lower category id, so equal inputs always give equal plans.
pub fn compute_plan(
    categories: &[Category],
    generated: &HashMap<i64, u32>,
    daily_target: u32,
) -> Vec<PlannedUnit> {
    let mut units: Vec<(Category, u32)> = categories
        .iter()
        .filter_map(|category| {
            let done = generated.get(&category.id).copied().unwrap_or(0);
            let deficit = daily_target.saturating_sub(done);
            (deficit > 0).then(|| (category.clone(), deficit))
        })
        .collect();

    units.sort_by(|(a, da), (b, db)| db.cmp(da).then(a.id.cmp(&b.id)));

    units
        .into_iter()
        .enumerate()
        .map(|(priority, (category, deficit))| PlannedUnit {
            category,
            deficit,
            priority,
        })
        .collect()
}

/// Plan for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyPlan {
    pub day: NaiveDate,
    pub daily_target: u32,
    /// Categories known to the store, planned or not
    pub total_categories: usize,
    pub units: Vec<PlannedUnit>,
}

impl DailyPlan {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Master articles still needed across all categories
    pub fn total_deficit(&self) -> u32 {
        self.units.iter().map(|u| u.deficit).sum()
    }

    /// Target recorded on the day's job row
    pub fn job_target(&self) -> u32 {
        let categories = u32::try_from(self.total_categories).unwrap_or(u32::MAX);
        self.daily_target.saturating_mul(categories)
    }
}

/// Reads today's progress from the store and computes the plan
#[derive(Clone)]
pub struct QuotaPlanner {
    store: SharedContentStore,
    source_language: String,
}

impl QuotaPlanner {
    pub fn new(store: SharedContentStore, source_language: impl Into<String>) -> Self {
        Self {
            store,
            source_language: source_language.into(),
        }
    }

    /// Plan for `day`; a store error is returned as-is, never retried here
    pub async fn plan(&self, day: NaiveDate, daily_target: u32) -> Result<DailyPlan, StoreError> {
        let categories = self.store.list_categories().await?;
        let generated = self
            .store
            .count_generated(day, &self.source_language)
            .await?;

        let units = compute_plan(&categories, &generated, daily_target);
        debug!(
            day = %day,
            categories = categories.len(),
            planned = units.len(),
            "Quota plan computed"
        );
        Ok(DailyPlan {
            day,
            daily_target,
            total_categories: categories.len(),
            units,
        })
    }

    /// Per-category committed counts for `day`
    pub async fn progress(&self, day: NaiveDate) -> Result<HashMap<i64, u32>, StoreError> {
        self.store.count_generated(day, &self.source_language).await
    }
}
