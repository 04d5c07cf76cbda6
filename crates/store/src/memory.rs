//! In-memory store backend, used by tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::{
    CreateDraftPlan, FarmRecord, FarmSettings, Paddock, PaddockRead, Plan, PlanRead, PlanWrite,
    Result, Section, SettingsRead, StoreError,
};

/// A store that keeps every farm record in process memory.
#[derive(Default)]
pub struct MemoryStore {
    farms: RwLock<HashMap<String, FarmRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record for a farm, creating it if absent.
    pub async fn put_farm(&self, farm_id: &str, record: FarmRecord) {
        self.farms
            .write()
            .await
            .insert(farm_id.to_string(), record);
    }

    /// Seed a farm with paddocks and settings and no plan history.
    pub async fn seed_farm(
        &self,
        farm_id: &str,
        paddocks: Vec<Paddock>,
        settings: FarmSettings,
    ) {
        self.put_farm(
            farm_id,
            FarmRecord {
                paddocks,
                settings: Some(settings),
                plans: Vec::new(),
            },
        )
        .await;
    }

    /// Snapshot of all plans recorded for a farm.
    pub async fn plans(&self, farm_id: &str) -> Result<Vec<Plan>> {
        let farms = self.farms.read().await;
        let record = farms
            .get(farm_id)
            .ok_or_else(|| StoreError::FarmNotFound(farm_id.to_string()))?;
        Ok(record.plans.clone())
    }

    async fn with_farm<T>(
        &self,
        farm_id: &str,
        f: impl FnOnce(&FarmRecord) -> Result<T>,
    ) -> Result<T> {
        let farms = self.farms.read().await;
        let record = farms
            .get(farm_id)
            .ok_or_else(|| StoreError::FarmNotFound(farm_id.to_string()))?;
        f(record)
    }

    async fn with_farm_mut<T>(
        &self,
        farm_id: &str,
        f: impl FnOnce(&mut FarmRecord) -> Result<T>,
    ) -> Result<T> {
        let mut farms = self.farms.write().await;
        let record = farms
            .get_mut(farm_id)
            .ok_or_else(|| StoreError::FarmNotFound(farm_id.to_string()))?;
        f(record)
    }
}

#[async_trait]
impl PaddockRead for MemoryStore {
    async fn list_paddocks(&self, farm_id: &str) -> Result<Vec<Paddock>> {
        self.with_farm(farm_id, |record| {
            let mut paddocks = record.paddocks.clone();
            paddocks.sort_by(|a, b| b.ndvi_mean.total_cmp(&a.ndvi_mean));
            Ok(paddocks)
        })
        .await
    }

    async fn get_paddock(&self, farm_id: &str, paddock_id: &str) -> Result<Paddock> {
        self.with_farm(farm_id, |record| record.paddock(paddock_id).cloned())
            .await
    }

    async fn prior_sections(
        &self,
        farm_id: &str,
        paddock_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<Section>> {
        self.with_farm(farm_id, |record| Ok(record.prior_sections(paddock_id, as_of)))
            .await
    }

    async fn grazed_percentage(
        &self,
        farm_id: &str,
        paddock_id: &str,
        as_of: NaiveDate,
    ) -> Result<f64> {
        self.with_farm(farm_id, |record| record.grazed_percentage(paddock_id, as_of))
            .await
    }
}

#[async_trait]
impl SettingsRead for MemoryStore {
    async fn farm_settings(&self, farm_id: &str) -> Result<Option<FarmSettings>> {
        self.with_farm(farm_id, |record| Ok(record.settings)).await
    }
}

#[async_trait]
impl PlanWrite for MemoryStore {
    async fn create_draft_plan(&self, draft: CreateDraftPlan) -> Result<String> {
        let farm_id = draft.farm_id.clone();
        self.with_farm_mut(&farm_id, |record| Ok(record.upsert_draft(draft)))
            .await
    }

    async fn finalize_plan(&self, farm_id: &str, plan_id: &str) -> Result<()> {
        self.with_farm_mut(farm_id, |record| record.finalize(plan_id))
            .await
    }
}

#[async_trait]
impl PlanRead for MemoryStore {
    async fn plan_for_date(&self, farm_id: &str, date: NaiveDate) -> Result<Option<Plan>> {
        self.with_farm(farm_id, |record| Ok(record.plan_for_date(date)))
            .await
    }
}
