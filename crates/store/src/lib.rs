//! Farm state repositories for the grazing-plan engine.
//!
//! The engine only ever sees the read/write traits defined here. Two
//! implementations are provided: [`MemoryStore`] for tests and dry runs,
//! and [`FileStore`] which keeps one JSON document per farm on disk.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod file;
pub mod memory;
mod model;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use model::{
    CreateDraftPlan, FarmSettings, Paddock, PaddockStatus, Plan, PlanStatus, Section,
};

/// Repository errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt farm document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("farm not found: {0}")]
    FarmNotFound(String),

    #[error("paddock not found: {0}")]
    PaddockNotFound(String),

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("plan {0} is not a draft")]
    NotADraft(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Read access to paddock state.
#[async_trait]
pub trait PaddockRead: Send + Sync {
    /// All paddocks of the farm with their latest NDVI, rest days, status
    /// and boundary geometry, sorted by NDVI descending.
    async fn list_paddocks(&self, farm_id: &str) -> Result<Vec<Paddock>>;

    /// Single paddock detail.
    async fn get_paddock(&self, farm_id: &str, paddock_id: &str) -> Result<Paddock>;

    /// Sections already recorded in the paddock for the active rotation.
    /// Excludes sections dated `as_of` (the plan being generated) and
    /// sections of rejected plans, newest first.
    async fn prior_sections(
        &self,
        farm_id: &str,
        paddock_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<Section>>;

    /// Percentage (0..=100) of the paddock already covered by prior
    /// sections, with the same exclusions as [`Self::prior_sections`].
    async fn grazed_percentage(
        &self,
        farm_id: &str,
        paddock_id: &str,
        as_of: NaiveDate,
    ) -> Result<f64>;
}

/// Read access to farm settings. `None` means the farm document carries no settings of its own; the
/// caller decides which defaults apply.
#[async_trait]
pub trait SettingsRead: Send + Sync {
    async fn farm_settings(&self, farm_id: &str) -> Result<Option<FarmSettings>>;
}

/// Write access to plans.
#[async_trait]
pub trait PlanWrite: Send + Sync {
    /// Persist a draft plan with its section, returning the plan id.
    /// At most one plan may exist per (farm, date); a second draft for the
    /// same day updates the existing plan in place.
    async fn create_draft_plan(&self, draft: CreateDraftPlan) -> Result<String>;

    /// Transition the given draft to pending operator review.
    async fn finalize_plan(&self, farm_id: &str, plan_id: &str) -> Result<()>;
}

/// Read access to plans, used by operator-facing surfaces and tests.
#[async_trait]
pub trait PlanRead: Send + Sync {
    async fn plan_for_date(&self, farm_id: &str, date: NaiveDate) -> Result<Option<Plan>>;
}

/// The full persisted state of one farm. Shared by both store backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmRecord {
    #[serde(default)]
    pub paddocks: Vec<Paddock>,
    #[serde(default)]
    pub settings: Option<FarmSettings>,
    #[serde(default)]
    pub plans: Vec<Plan>,
}

impl FarmRecord {
    fn paddock(&self, paddock_id: &str) -> Result<&Paddock> {
        self.paddocks
            .iter()
            .find(|p| p.external_id == paddock_id)
            .ok_or_else(|| StoreError::PaddockNotFound(paddock_id.to_string()))
    }

    /// Plans that count toward rotation coverage of a paddock.
    fn counted_plans(&self, paddock_id: &str, as_of: NaiveDate) -> impl Iterator<Item = &Plan> {
        let paddock_id = paddock_id.to_string();
        self.plans.iter().filter(move |plan| {
            plan.target_paddock_id == paddock_id
                && plan.section.is_some()
                && plan.date != as_of
                && plan.status != PlanStatus::Rejected
        })
    }

    fn prior_sections(&self, paddock_id: &str, as_of: NaiveDate) -> Vec<Section> {
        let mut sections: Vec<Section> = self
            .counted_plans(paddock_id, as_of)
            .filter_map(|plan| plan.section.clone())
            .collect();
        sections.sort_by(|a, b| b.date.cmp(&a.date));
        sections
    }

    fn grazed_percentage(&self, paddock_id: &str, as_of: NaiveDate) -> Result<f64> {
        let paddock = self.paddock(paddock_id)?;
        if paddock.area_ha <= 0.0 {
            return Ok(0.0);
        }
        let grazed: f64 = self
            .counted_plans(paddock_id, as_of)
            .filter_map(|plan| plan.section.as_ref())
            .map(|section| section.area_ha)
            .sum();
        Ok(((grazed / paddock.area_ha) * 100.0).round())
    }

    /// Insert or update the plan for (farm, date). Returns the plan id.
    fn upsert_draft(&mut self, draft: CreateDraftPlan) -> String {
        let now = Local::now();
        if let Some(existing) = self.plans.iter_mut().find(|p| p.date == draft.date) {
            tracing::debug!(plan_id = %existing.id, "updating existing plan for the day");
            existing.target_paddock_id = draft.target_paddock_id;
            existing.section = Some(draft.section);
            existing.confidence = draft.confidence;
            existing.reasoning = draft.reasoning;
            existing.status = PlanStatus::Draft;
            existing.updated_at = now;
            return existing.id.clone();
        }

        let plan = Plan {
            id: Uuid::new_v4().to_string(),
            farm_id: draft.farm_id,
            date: draft.date,
            target_paddock_id: draft.target_paddock_id,
            section: Some(draft.section),
            confidence: draft.confidence,
            reasoning: draft.reasoning,
            status: PlanStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        let id = plan.id.clone();
        self.plans.push(plan);
        id
    }

    fn finalize(&mut self, plan_id: &str) -> Result<()> {
        let plan = self
            .plans
            .iter_mut()
            .find(|p| p.id == plan_id)
            .ok_or_else(|| StoreError::PlanNotFound(plan_id.to_string()))?;
        if plan.status != PlanStatus::Draft {
            return Err(StoreError::NotADraft(plan_id.to_string()));
        }
        plan.status = PlanStatus::Pending;
        plan.updated_at = Local::now();
        Ok(())
    }

    fn plan_for_date(&self, date: NaiveDate) -> Option<Plan> {
        self.plans.iter().find(|p| p.date == date).cloned()
    }
}
