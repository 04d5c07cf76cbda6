//! Domain types shared by the repositories and the decision engine.

use chrono::{DateTime, Local, NaiveDate};
use openpasture_geometry::SectionPolygon;
use serde::{Deserialize, Serialize};

/// Operational status of a paddock, derived from vegetation health and rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddockStatus {
    Ready,
    AlmostReady,
    Grazed,
    Recovering,
}

impl PaddockStatus {
    const NDVI_READY: f64 = 0.40;
    const REST_READY_DAYS: u32 = 21;
    const REST_ALMOST_DAYS: u32 = 14;
    const REST_GRAZED_DAYS: u32 = 7;

    /// Derive status from the latest observation, mirroring what the
    /// ingestion pipeline records.
    pub fn derive(ndvi_mean: f64, rest_days: u32) -> Self {
        if ndvi_mean >= Self::NDVI_READY && rest_days >= Self::REST_READY_DAYS {
            Self::Ready
        } else if ndvi_mean >= Self::NDVI_READY && rest_days >= Self::REST_ALMOST_DAYS {
            Self::AlmostReady
        } else if rest_days < Self::REST_GRAZED_DAYS {
            Self::Grazed
        } else {
            Self::Recovering
        }
    }
}

/// A management cell of the farm, the unit the policy selects between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paddock {
    pub external_id: String,
    pub name: String,
    /// Mean NDVI from the latest usable observation, 0..=1.
    pub ndvi_mean: f64,
    /// Days since the paddock was last grazed.
    pub rest_days: u32,
    pub area_ha: f64,
    /// Closed boundary polygon. The full-list query always carries it; the
    /// single-paddock detail query may omit it.
    pub boundary: Option<SectionPolygon>,
    pub status: PaddockStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_grazed: Option<NaiveDate>,
}

/// One day's grazing footprint inside a paddock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub date: NaiveDate,
    pub paddock_id: String,
    pub geometry: SectionPolygon,
    pub area_ha: f64,
    /// [lng, lat]
    pub centroid: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_ndvi: Option<f64>,
    pub justification: String,
}

/// Review status of a daily plan. The engine only ever produces `Draft` and
/// `Pending`; the terminal states belong to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Pending,
    Approved,
    Modified,
    Rejected,
}

/// The per-day recommendation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub farm_id: String,
    pub date: NaiveDate,
    pub target_paddock_id: String,
    pub section: Option<Section>,
    /// 0..=1
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub status: PlanStatus,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

/// Farm-level policy settings, read-only to the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FarmSettings {
    #[serde(default = "default_min_ndvi_threshold")]
    pub min_ndvi_threshold: f64,
    #[serde(default = "default_min_rest_period_days")]
    pub min_rest_period_days: u32,
    /// Advisory target section size as a fraction of paddock area.
    #[serde(default = "default_section_pct")]
    pub default_section_pct: f64,
}

impl Default for FarmSettings {
    fn default() -> Self {
        Self {
            min_ndvi_threshold: default_min_ndvi_threshold(),
            min_rest_period_days: default_min_rest_period_days(),
            default_section_pct: default_section_pct(),
        }
    }
}

fn default_min_ndvi_threshold() -> f64 {
    0.40
}

fn default_min_rest_period_days() -> u32 {
    21
}

fn default_section_pct() -> f64 {
    0.20
}

/// Arguments for creating a draft plan with its section in one write.
#[derive(Debug, Clone)]
pub struct CreateDraftPlan {
    pub farm_id: String,
    pub date: NaiveDate,
    pub target_paddock_id: String,
    pub section: Section,
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ready() {
        assert_eq!(PaddockStatus::derive(0.52, 30), PaddockStatus::Ready);
        assert_eq!(PaddockStatus::derive(0.40, 21), PaddockStatus::Ready);
    }

    #[test]
    fn test_status_almost_ready() {
        assert_eq!(PaddockStatus::derive(0.45, 14), PaddockStatus::AlmostReady);
        assert_eq!(PaddockStatus::derive(0.45, 20), PaddockStatus::AlmostReady);
    }

    #[test]
    fn test_status_grazed() {
        assert_eq!(PaddockStatus::derive(0.30, 3), PaddockStatus::Grazed);
        assert_eq!(PaddockStatus::derive(0.45, 0), PaddockStatus::Grazed);
    }

    #[test]
    fn test_status_recovering() {
        assert_eq!(PaddockStatus::derive(0.32, 15), PaddockStatus::Recovering);
        assert_eq!(PaddockStatus::derive(0.39, 40), PaddockStatus::Recovering);
    }

    #[test]
    fn test_farm_settings_defaults() {
        let settings = FarmSettings::default();
        assert_eq!(settings.min_ndvi_threshold, 0.40);
        assert_eq!(settings.min_rest_period_days, 21);
        assert_eq!(settings.default_section_pct, 0.20);
    }

    #[test]
    fn test_farm_settings_partial_json() {
        let settings: FarmSettings =
            serde_json::from_str(r#"{ "min_ndvi_threshold": 0.35 }"#).unwrap();
        assert_eq!(settings.min_ndvi_threshold, 0.35);
        assert_eq!(settings.min_rest_period_days, 21);
    }

    #[test]
    fn test_plan_status_serde() {
        let text = serde_json::to_string(&PlanStatus::Pending).unwrap();
        assert_eq!(text, "\"pending\"");
        let back: PlanStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(back, PlanStatus::Rejected);
    }
}
