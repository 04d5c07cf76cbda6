//! Drives the two-tool protocol against the generative capability.
//!
//! One completion round trip, then the returned tool calls are executed
//! strictly sequentially through an explicit state machine
//! (`NoPlan -> Drafted -> Finalized`). The machine is keyed by validated
//! tool name and tolerates missing, repeated and out-of-order calls; a
//! failing call is logged and traced but never aborts the batch.

use openpasture_geometry::SectionPolygon;
use openpasture_store::{CreateDraftPlan, Paddock, PlanWrite, Section};
use openpasture_provider::{
    Completion, CompletionRequest, DeclaredTool, Provider, ToolChoice, ToolInvocation,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::FarmContext;
use crate::policy::Selection;
use crate::trace::{TraceEvent, TraceSink};
use crate::Result;

/// Sections reaching out of the boundary by more than this fraction of
/// their area are rejected instead of clipped.
const MIN_CONTAINED_FRACTION: f64 = 0.99;
/// Above this fraction the section counts as fully contained and is stored
/// exactly as submitted.
const FULLY_CONTAINED_FRACTION: f64 = 0.9999;
/// Tolerated overlap with any single prior section, as a fraction of the
/// proposed section's area.
const MAX_OVERLAP_FRACTION: f64 = 0.05;

/// Per-tool-call failures. These stay local to the call that raised them.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("sectionGeometry is required")]
    MissingGeometry,

    #[error("invalid arguments: {0}")]
    Arguments(#[from] serde_json::Error),

    #[error("invalid section geometry: {0}")]
    Geometry(#[from] openpasture_geometry::GeometryError),

    #[error("target paddock {0} has no boundary geometry")]
    NoBoundary(String),

    #[error("section lies outside the paddock boundary ({contained_pct:.1}% contained)")]
    OutsideBoundary { contained_pct: f64 },

    #[error("section overlaps a prior section from {date} ({overlap_pct:.1}% of its area)")]
    Overlap {
        date: chrono::NaiveDate,
        overlap_pct: f64,
    },

    #[error("confidence {0} is outside 0..=1")]
    ConfidenceRange(f64),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("finalizePlan called but this run created no draft")]
    NoDraftInRun,

    #[error(transparent)]
    Store(#[from] openpasture_store::StoreError),
}

/// Where the run currently sits in the plan lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    NoPlan,
    Drafted { plan_id: String },
    Finalized { plan_id: String },
}

impl RunState {
    fn plan_id(&self) -> Option<&str> {
        match self {
            Self::NoPlan => None,
            Self::Drafted { plan_id } | Self::Finalized { plan_id } => Some(plan_id),
        }
    }
}

/// What one engine run reports back to the caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub plan_id: Option<String>,
    pub plan_created: bool,
    pub plan_finalized: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposeSectionArgs {
    #[serde(default)]
    #[allow(dead_code)]
    farm_id: Option<String>,
    #[serde(default)]
    target_paddock_id: Option<String>,
    #[serde(default)]
    section_geometry: Option<Value>,
    #[serde(default)]
    section_area_hectares: Option<f64>,
    #[serde(default)]
    section_centroid: Option<[f64; 2]>,
    #[serde(default)]
    section_avg_ndvi: Option<f64>,
    section_justification: String,
    #[serde(default)]
    #[allow(dead_code)]
    paddock_grazed_percentage: Option<f64>,
    confidence: f64,
    reasoning: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizePlanArgs {
    #[serde(default)]
    #[allow(dead_code)]
    farm_id: Option<String>,
}

/// The only two tools the capability may invoke.
pub fn declared_tools() -> Vec<DeclaredTool> {
    vec![
        DeclaredTool::new(
            "proposeSection",
            "Persist a draft grazing plan with today's section polygon for the target paddock.",
            json!({
                "type": "object",
                "properties": {
                    "farmId": { "type": "string" },
                    "targetPaddockId": { "type": "string" },
                    "sectionGeometry": {
                        "type": "object",
                        "description": "GeoJSON Polygon in WGS84 lng/lat, fully inside the target paddock boundary"
                    },
                    "sectionAreaHectares": { "type": "number" },
                    "sectionCentroid": {
                        "type": "array",
                        "items": { "type": "number" },
                        "minItems": 2,
                        "maxItems": 2
                    },
                    "sectionAvgNdvi": { "type": "number", "minimum": 0, "maximum": 1 },
                    "sectionJustification": { "type": "string" },
                    "paddockGrazedPercentage": { "type": "number", "minimum": 0, "maximum": 100 },
                    "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                    "reasoning": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["sectionGeometry", "sectionJustification", "confidence", "reasoning"]
            }),
        ),
        DeclaredTool::new(
            "finalizePlan",
            "Submit the draft plan created by proposeSection for operator review.",
            json!({
                "type": "object",
                "properties": {
                    "farmId": { "type": "string" }
                }
            }),
        ),
    ]
}

pub struct GeometryOrchestrator<'a, S> {
    store: &'a S,
    trace: &'a dyn TraceSink,
}

impl<'a, S: PlanWrite> GeometryOrchestrator<'a, S> {
    pub fn new(store: &'a S, trace: &'a dyn TraceSink) -> Self {
        Self { store, trace }
    }

    /// One provider round trip plus sequential tool execution.
    pub async fn execute(
        &self,
        provider: &dyn Provider,
        model: &str,
        system: &str,
        brief: &str,
        context: &FarmContext,
        selection: &Selection,
        target_sections: &[Section],
    ) -> Result<RunOutcome> {
        let request = CompletionRequest {
            model: model.to_string(),
            messages: vec![
                openpasture_provider::Message::system(system),
                openpasture_provider::Message::user(brief),
            ],
            tools: declared_tools(),
            tool_choice: ToolChoice::Auto,
            ..CompletionRequest::default()
        };

        let completion = provider.complete(request).await?;
        Ok(self
            .run_tool_calls(&completion, context, selection, target_sections)
            .await)
    }

    /// Executes the returned calls strictly sequentially so two drafts can
    /// never race for the same farm and day within one run.
    async fn run_tool_calls(
        &self,
        completion: &Completion,
        context: &FarmContext,
        selection: &Selection,
        target_sections: &[Section],
    ) -> RunOutcome {
        if completion.tool_calls.is_empty() {
            // Soft failure: the capability declined to plan. Callers may retry.
            warn!(
                farm_id = %context.farm_id,
                text = completion.content.as_deref().unwrap_or(""),
                "no tool calls returned"
            );
            self.trace.record(TraceEvent::RunComplete {
                success: true,
                plan_created: false,
                plan_finalized: false,
            });
            return RunOutcome {
                success: true,
                plan_id: None,
                plan_created: false,
                plan_finalized: false,
            };
        }

        let mut state = RunState::NoPlan;
        for call in &completion.tool_calls {
            self.trace.record(TraceEvent::ToolCall {
                name: call.name.clone(),
            });
            match self
                .apply_call(call, &state, context, selection, target_sections)
                .await
            {
                Ok(next) => state = next,
                Err(err) => {
                    warn!(tool = %call.name, error = %err, "tool call failed");
                    self.trace.record(TraceEvent::ToolError {
                        name: call.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let plan_created = !matches!(state, RunState::NoPlan);
        let plan_finalized = matches!(state, RunState::Finalized { .. });
        let outcome = RunOutcome {
            success: plan_created && plan_finalized,
            plan_id: state.plan_id().map(|id| id.to_string()),
            plan_created,
            plan_finalized,
        };
        self.trace.record(TraceEvent::RunComplete {
            success: outcome.success,
            plan_created,
            plan_finalized,
        });
        outcome
    }

    async fn apply_call(
        &self,
        call: &ToolInvocation,
        state: &RunState,
        context: &FarmContext,
        selection: &Selection,
        target_sections: &[Section],
    ) -> std::result::Result<RunState, ToolError> {
        match call.name.as_str() {
            "proposeSection" => {
                let plan_id = self
                    .propose_section(&call.arguments, context, selection, target_sections)
                    .await?;
                info!(plan_id = %plan_id, "draft plan created");
                self.trace.record(TraceEvent::DraftCreated {
                    plan_id: plan_id.clone(),
                });
                Ok(RunState::Drafted { plan_id })
            }
            "finalizePlan" => {
                let _args: FinalizePlanArgs =
                    serde_json::from_value(call.arguments.clone()).unwrap_or_default();
                // Only the draft created by this run may be finalized; an
                // implicit "current draft for the farm" could pick up a
                // stale prior-day plan.
                let plan_id = match state.plan_id() {
                    Some(id) => id.to_string(),
                    None => return Err(ToolError::NoDraftInRun),
                };
                self.store.finalize_plan(&context.farm_id, &plan_id).await?;
                info!(plan_id = %plan_id, "plan submitted for review");
                self.trace.record(TraceEvent::PlanFinalized {
                    plan_id: plan_id.clone(),
                });
                Ok(RunState::Finalized { plan_id })
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn propose_section(
        &self,
        arguments: &Value,
        context: &FarmContext,
        selection: &Selection,
        target_sections: &[Section],
    ) -> std::result::Result<String, ToolError> {
        // A null geometry must fail before strict deserialization so the
        // error names the business rule, not the serde path.
        if arguments
            .get("sectionGeometry")
            .map(Value::is_null)
            .unwrap_or(true)
        {
            return Err(ToolError::MissingGeometry);
        }
        let args: ProposeSectionArgs = serde_json::from_value(arguments.clone())?;
        let geometry_value = args.section_geometry.ok_or(ToolError::MissingGeometry)?;
        let geometry = SectionPolygon::from_json_value(&geometry_value)?;

        let target = self.resolve_target(args.target_paddock_id.as_deref(), selection);
        let boundary = target
            .boundary
            .as_ref()
            .ok_or_else(|| ToolError::NoBoundary(target.external_id.clone()))?;

        let geometry = validate_against_boundary(geometry, boundary)?;
        validate_against_prior_sections(&geometry, target_sections)?;

        let confidence = normalize_confidence(args.confidence)?;
        let area_ha = args
            .section_area_hectares
            .unwrap_or_else(|| geometry.area_hectares());
        let centroid = args
            .section_centroid
            .unwrap_or_else(|| geometry.centroid_lnglat());

        let section = Section {
            id: Uuid::new_v4().to_string(),
            date: context.date,
            paddock_id: target.external_id.clone(),
            geometry,
            area_ha,
            centroid,
            avg_ndvi: args.section_avg_ndvi,
            justification: args.section_justification,
        };

        let plan_id = self
            .store
            .create_draft_plan(CreateDraftPlan {
                farm_id: context.farm_id.clone(),
                date: context.date,
                target_paddock_id: target.external_id.clone(),
                section,
                confidence,
                reasoning: args.reasoning,
            })
            .await?;
        Ok(plan_id)
    }

    /// The capability may echo a target paddock id. Any id other than the
    /// policy's own target is ignored with a warning; the policy decision
    /// stands.
    fn resolve_target<'b>(
        &self,
        requested: Option<&str>,
        selection: &'b Selection,
    ) -> &'b Paddock {
        match requested {
            Some(id) if id != selection.target.external_id => {
                warn!(
                    requested = id,
                    selected = %selection.target.external_id,
                    "capability proposed a different paddock; keeping the policy target"
                );
                &selection.target
            }
            _ => &selection.target,
        }
    }
}

fn validate_against_boundary(
    geometry: SectionPolygon,
    boundary: &SectionPolygon,
) -> std::result::Result<SectionPolygon, ToolError> {
    let contained = geometry.containment_fraction(boundary);
    if contained < MIN_CONTAINED_FRACTION {
        return Err(ToolError::OutsideBoundary {
            contained_pct: contained * 100.0,
        });
    }
    if contained < FULLY_CONTAINED_FRACTION {
        // Slightly outside: clip to the boundary rather than reject.
        if let Some(clipped) = geometry.clip_to(boundary) {
            info!(
                contained_pct = contained * 100.0,
                "section clipped to paddock boundary"
            );
            return Ok(clipped);
        }
    }
    Ok(geometry)
}

fn validate_against_prior_sections(
    geometry: &SectionPolygon,
    prior: &[Section],
) -> std::result::Result<(), ToolError> {
    for section in prior {
        let overlap = geometry.overlap_fraction(&section.geometry);
        if overlap > MAX_OVERLAP_FRACTION {
            return Err(ToolError::Overlap {
                date: section.date,
                overlap_pct: overlap * 100.0,
            });
        }
    }
    Ok(())
}

/// Confidence may arrive on a 0-100 scale; bring it back to 0-1.
fn normalize_confidence(raw: f64) -> std::result::Result<f64, ToolError> {
    let value = if raw > 1.0 && raw <= 100.0 {
        raw / 100.0
    } else {
        raw
    };
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(ToolError::ConfidenceRange(raw));
    }
    Ok(value)
}
