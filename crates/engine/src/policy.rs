//! Deterministic target-paddock selection.
//!
//! Pure: reads paddock state, produces a `Selection`. The herd is always
//! assigned somewhere; "rest" is not representable in `Recommendation`, and
//! the only way to end up without a target is an empty paddock list, which
//! aborts the run as an internal-consistency error.

use std::cmp::Ordering;
use std::fmt;

use openpasture_store::Paddock;
use serde::Serialize;

use crate::{EngineError, Result};

pub const CONFIDENCE_GRAZE_CURRENT: f64 = 0.75;
pub const CONFIDENCE_MOVE_QUALIFIED: f64 = 0.55;
pub const CONFIDENCE_MOVE_BEST_AVAILABLE: f64 = 0.45;
pub const CONFIDENCE_STAY_AS_BEST: f64 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Graze,
    Move,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graze => write!(f, "graze"),
            Self::Move => write!(f, "move"),
        }
    }
}

/// The policy's decision, fed into the brief and the orchestrator.
#[derive(Debug, Clone)]
pub struct Selection {
    pub target: Paddock,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

/// Best-first order: NDVI descending, then rest days descending. Never by
/// identity or list position.
fn best_first(a: &Paddock, b: &Paddock) -> Ordering {
    b.ndvi_mean
        .total_cmp(&a.ndvi_mean)
        .then(b.rest_days.cmp(&a.rest_days))
}

pub fn select_target(
    current: Option<&Paddock>,
    paddocks: &[Paddock],
    ndvi_threshold: f64,
) -> Result<Selection> {
    // 1. Current paddock still has enough feed: keep grazing it.
    if let Some(cur) = current {
        if cur.ndvi_mean >= ndvi_threshold {
            return Ok(finish(Selection {
                target: cur.clone(),
                recommendation: Recommendation::Graze,
                confidence: CONFIDENCE_GRAZE_CURRENT,
                reasoning: vec![
                    format!(
                        "Current paddock NDVI {:.2} meets the {:.2} threshold",
                        cur.ndvi_mean, ndvi_threshold
                    ),
                    format!("Continue grazing {}", cur.name),
                ],
            }, paddocks));
        }
    }

    // 2. Move to the best qualified alternative.
    let qualified: Vec<&Paddock> = paddocks
        .iter()
        .filter(|p| p.ndvi_mean >= ndvi_threshold)
        .collect();
    if let Some(target) = qualified.iter().min_by(|a, b| best_first(a, b)) {
        return Ok(finish(Selection {
            target: (*target).clone(),
            recommendation: Recommendation::Move,
            confidence: CONFIDENCE_MOVE_QUALIFIED,
            reasoning: vec![
                match current {
                    Some(cur) => format!(
                        "Current paddock NDVI {:.2} is below the {:.2} threshold",
                        cur.ndvi_mean, ndvi_threshold
                    ),
                    None => "No paddock is currently being grazed".to_string(),
                },
                format!(
                    "{} has the best NDVI ({:.2}) of {} qualified paddocks, rested {} days",
                    target.name,
                    target.ndvi_mean,
                    qualified.len(),
                    target.rest_days
                ),
            ],
        }, paddocks));
    }

    // 3. Nothing qualifies: take the farm-wide best, staying put if the
    //    current paddock already is it.
    let best = paddocks
        .iter()
        .min_by(|a, b| best_first(a, b))
        .ok_or_else(|| {
            EngineError::Invariant("no paddocks available to assign the herd".to_string())
        })?;

    let staying = current.is_some_and(|cur| cur.external_id == best.external_id);
    let selection = if staying {
        Selection {
            target: best.clone(),
            recommendation: Recommendation::Graze,
            confidence: CONFIDENCE_STAY_AS_BEST,
            reasoning: vec![
                format!("No paddock meets the {ndvi_threshold:.2} NDVI threshold"),
                format!(
                    "{} is already the best available (NDVI {:.2}); continue grazing",
                    best.name, best.ndvi_mean
                ),
            ],
        }
    } else {
        Selection {
            target: best.clone(),
            recommendation: Recommendation::Move,
            confidence: CONFIDENCE_MOVE_BEST_AVAILABLE,
            reasoning: vec![
                format!("No paddock meets the {ndvi_threshold:.2} NDVI threshold"),
                format!(
                    "{} is the best available (NDVI {:.2}, rested {} days)",
                    best.name, best.ndvi_mean, best.rest_days
                ),
            ],
        }
    };
    Ok(finish(selection, paddocks))
}

/// Backfill boundary geometry from the full list when the chosen record came
/// from the single-paddock detail query, which may omit it.
fn finish(mut selection: Selection, paddocks: &[Paddock]) -> Selection {
    if selection.target.boundary.is_none() {
        if let Some(listed) = paddocks
            .iter()
            .find(|p| p.external_id == selection.target.external_id)
        {
            selection.target.boundary = listed.boundary.clone();
        }
    }
    selection
}
