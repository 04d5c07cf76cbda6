//! File-backed store, one JSON document per farm.
//!
//! Documents are written pretty-printed so operators can inspect and hand
//! edit farm state. Writes go through a single mutex; the engine performs
//! at most a handful of writes per run, so contention is not a concern.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::{
    CreateDraftPlan, FarmRecord, FarmSettings, Paddock, PaddockRead, Plan, PlanRead, PlanWrite,
    Result, Section, SettingsRead, StoreError,
};

pub struct FileStore {
    farms_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(farms_dir: impl Into<PathBuf>) -> Self {
        Self {
            farms_dir: farms_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn farm_path(&self, farm_id: &str) -> PathBuf {
        // Keep file names flat even if an id contains separators.
        let safe: String = farm_id
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.farms_dir.join(format!("{safe}.json"))
    }

    async fn load(&self, farm_id: &str) -> Result<FarmRecord> {
        let path = self.farm_path(farm_id);
        if !path.exists() {
            return Err(StoreError::FarmNotFound(farm_id.to_string()));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let record = serde_json::from_str(&content)?;
        Ok(record)
    }

    async fn save(&self, farm_id: &str, record: &FarmRecord) -> Result<()> {
        if !self.farms_dir.exists() {
            tokio::fs::create_dir_all(&self.farms_dir).await?;
        }
        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(self.farm_path(farm_id), content).await?;
        Ok(())
    }

    /// Write the full record for a farm, used by `init` and by tests.
    pub async fn put_farm(&self, farm_id: &str, record: &FarmRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.save(farm_id, record).await
    }

    pub fn farms_dir(&self) -> &Path {
        &self.farms_dir
    }
}

#[async_trait]
impl PaddockRead for FileStore {
    async fn list_paddocks(&self, farm_id: &str) -> Result<Vec<Paddock>> {
        let record = self.load(farm_id).await?;
        let mut paddocks = record.paddocks;
        paddocks.sort_by(|a, b| b.ndvi_mean.total_cmp(&a.ndvi_mean));
        Ok(paddocks)
    }

    async fn get_paddock(&self, farm_id: &str, paddock_id: &str) -> Result<Paddock> {
        let record = self.load(farm_id).await?;
        record.paddock(paddock_id).cloned()
    }

    async fn prior_sections(
        &self,
        farm_id: &str,
        paddock_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<Section>> {
        let record = self.load(farm_id).await?;
        Ok(record.prior_sections(paddock_id, as_of))
    }

    async fn grazed_percentage(
        &self,
        farm_id: &str,
        paddock_id: &str,
        as_of: NaiveDate,
    ) -> Result<f64> {
        let record = self.load(farm_id).await?;
        record.grazed_percentage(paddock_id, as_of)
    }
}

#[async_trait]
impl SettingsRead for FileStore {
    async fn farm_settings(&self, farm_id: &str) -> Result<Option<FarmSettings>> {
        let record = self.load(farm_id).await?;
        Ok(record.settings)
    }
}

#[async_trait]
impl PlanWrite for FileStore {
    async fn create_draft_plan(&self, draft: CreateDraftPlan) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        let farm_id = draft.farm_id.clone();
        let mut record = self.load(&farm_id).await?;
        let id = record.upsert_draft(draft);
        self.save(&farm_id, &record).await?;
        Ok(id)
    }

    async fn finalize_plan(&self, farm_id: &str, plan_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load(farm_id).await?;
        record.finalize(plan_id)?;
        self.save(farm_id, &record).await
    }
}

#[async_trait]
impl PlanRead for FileStore {
    async fn plan_for_date(&self, farm_id: &str, date: NaiveDate) -> Result<Option<Plan>> {
        let record = self.load(farm_id).await?;
        Ok(record.plan_for_date(date))
    }
}
