//! End-to-end engine tests over the in-memory store with a scripted
//! provider standing in for the generative capability:
//! - Full propose + finalize happy path
//! - Zero tool calls as a soft failure
//! - Missing geometry rejection
//! - Out-of-order and unknown tool calls
//! - Per-call error isolation
//! - Boundary and overlap validation
//! - Geometry round-trip fidelity

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use openpasture_engine::{DailyPlanner, EngineError, MemorySink, TraceEvent};
use openpasture_geometry::SectionPolygon;
use openpasture_provider::{
    Completion, CompletionRequest, Provider, ProviderError, ToolInvocation, Usage,
};
use openpasture_store::{
    FarmRecord, FarmSettings, MemoryStore, Paddock, PaddockStatus, Plan, PlanRead, PlanStatus,
    Section,
};
use serde_json::{json, Value};

// ============================================================================
// Fixtures
// ============================================================================

struct ScriptedProvider {
    completions: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(completions: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            completions: Mutex::new(completions.into()),
            last_request: Mutex::new(None),
        }
    }

    fn returning_calls(calls: Vec<ToolInvocation>) -> Self {
        Self::new(vec![Ok(Completion {
            content: None,
            tool_calls: calls,
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        })])
    }

    fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        *self.last_request.lock().unwrap() = Some(request);
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ProviderError::InvalidResponse))
    }

    fn default_model(&self) -> String {
        "scripted/model".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

fn boundary() -> SectionPolygon {
    SectionPolygon::from_rings(vec![vec![
        [148.0, -35.0],
        [148.01, -35.0],
        [148.01, -34.99],
        [148.0, -34.99],
        [148.0, -35.0],
    ]])
    .unwrap()
}

fn section_geojson() -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [148.001, -34.999],
            [148.003, -34.999],
            [148.003, -34.997],
            [148.001, -34.997],
            [148.001, -34.999]
        ]]
    })
}

// Roughly 99.5% inside the eastern edge of the boundary: a 0.002-wide
// strip poking 0.00001 past lng 148.01.
fn straddling_geojson() -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [148.00801, -34.999],
            [148.01001, -34.999],
            [148.01001, -34.997],
            [148.00801, -34.997],
            [148.00801, -34.999]
        ]]
    })
}

fn outside_geojson() -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [148.02, -34.999],
            [148.022, -34.999],
            [148.022, -34.997],
            [148.02, -34.997],
            [148.02, -34.999]
        ]]
    })
}

fn paddock(id: &str, ndvi: f64, rest: u32) -> Paddock {
    Paddock {
        external_id: id.to_string(),
        name: format!("Paddock {id}"),
        ndvi_mean: ndvi,
        rest_days: rest,
        area_ha: 100.0,
        boundary: Some(boundary()),
        status: PaddockStatus::derive(ndvi, rest),
        last_grazed: None,
    }
}

fn day(text: &str) -> NaiveDate {
    text.parse().unwrap()
}

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .seed_farm(
            "farm-1",
            vec![paddock("p-a", 0.38, 5), paddock("p-b", 0.52, 30)],
            FarmSettings::default(),
        )
        .await;
    store
}

fn call(name: &str, arguments: Value) -> ToolInvocation {
    ToolInvocation {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments,
    }
}

fn propose_args() -> Value {
    json!({
        "farmId": "farm-1",
        "targetPaddockId": "p-b",
        "sectionGeometry": section_geojson(),
        "sectionJustification": "north strip has the strongest regrowth",
        "confidence": 0.72,
        "reasoning": ["moving to Paddock p-b", "section avoids the wet corner"]
    })
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_propose_then_finalize_succeeds() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::returning_calls(vec![
        call("proposeSection", propose_args()),
        call("finalizePlan", json!({"farmId": "farm-1"})),
    ]);
    let today = day("2026-08-24");

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(outcome.plan_created);
    assert!(outcome.plan_finalized);

    let plan: Plan = store.plan_for_date("farm-1", today).await.unwrap().unwrap();
    assert_eq!(Some(plan.id), outcome.plan_id);
    assert_eq!(plan.status, PlanStatus::Pending);
    assert_eq!(plan.target_paddock_id, "p-b");
    assert_eq!(plan.confidence, 0.72);
    assert!(plan.section.is_some());
}

#[tokio::test]
async fn test_section_geometry_round_trips_exactly() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::returning_calls(vec![
        call("proposeSection", propose_args()),
        call("finalizePlan", json!({})),
    ]);
    let today = day("2026-08-24");

    DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    let plan = store.plan_for_date("farm-1", today).await.unwrap().unwrap();
    let stored: Section = plan.section.unwrap();
    assert_eq!(stored.geometry.to_json_value(), section_geojson());
    assert!(stored.area_ha > 0.0);
}

#[tokio::test]
async fn test_request_declares_both_tools_and_carries_brief() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::returning_calls(vec![
        call("proposeSection", propose_args()),
        call("finalizePlan", json!({})),
    ]);

    DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(day("2026-08-24"))
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    let request = provider.last_request().unwrap();
    let names: Vec<String> = request.tools.iter().map(|t| t.name.clone()).collect();
    assert_eq!(names, vec!["proposeSection", "finalizePlan"]);

    let brief = request.messages[1].content.clone().unwrap();
    assert!(brief.contains("Paddock p-b"));
    assert!(brief.contains("Fresh paddock"));
    assert!(brief.contains("sectionGeometry"));
}

// ============================================================================
// Soft and hard failure modes
// ============================================================================

#[tokio::test]
async fn test_zero_tool_calls_is_soft_failure() {
    let store = seeded_store().await;
    let provider =
        ScriptedProvider::new(vec![Ok(Completion::text("I cannot plan today, sorry."))]);
    let today = day("2026-08-24");

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(!outcome.plan_created);
    assert!(!outcome.plan_finalized);
    assert!(outcome.plan_id.is_none());
    assert!(store
        .plan_for_date("farm-1", today)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_missing_geometry_rejected_and_nothing_persisted() {
    let store = seeded_store().await;
    let mut args = propose_args();
    args["sectionGeometry"] = Value::Null;
    let provider = ScriptedProvider::returning_calls(vec![
        call("proposeSection", args),
        call("finalizePlan", json!({})),
    ]);
    let sink = MemorySink::new();
    let today = day("2026-08-24");

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .with_trace(&sink)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(!outcome.plan_created);
    assert!(store
        .plan_for_date("farm-1", today)
        .await
        .unwrap()
        .is_none());

    let geometry_error = sink.events().into_iter().any(|event| {
        matches!(event, TraceEvent::ToolError { message, .. }
            if message.contains("sectionGeometry is required"))
    });
    assert!(geometry_error);
}

#[tokio::test]
async fn test_malformed_polygon_is_tool_error_not_run_failure() {
    let store = seeded_store().await;
    let mut args = propose_args();
    // Two vertices cannot form a polygon.
    args["sectionGeometry"] = json!({
        "type": "Polygon",
        "coordinates": [[[148.001, -34.999], [148.003, -34.999]]]
    });
    let provider = ScriptedProvider::returning_calls(vec![call("proposeSection", args)]);
    let sink = MemorySink::new();
    let today = day("2026-08-24");

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .with_trace(&sink)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    assert!(!outcome.plan_created);
    let geometry_error = sink.events().into_iter().any(|event| {
        matches!(event, TraceEvent::ToolError { message, .. }
            if message.contains("invalid section geometry"))
    });
    assert!(geometry_error);
}

#[tokio::test]
async fn test_finalize_before_propose_leaves_draft() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::returning_calls(vec![
        call("finalizePlan", json!({})),
        call("proposeSection", propose_args()),
    ]);
    let today = day("2026-08-24");

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    // The early finalize fails (no draft yet in this run) without aborting
    // the batch; the propose still lands as a draft.
    assert!(!outcome.success);
    assert!(outcome.plan_created);
    assert!(!outcome.plan_finalized);

    let plan = store.plan_for_date("farm-1", today).await.unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Draft);
}

#[tokio::test]
async fn test_tool_errors_do_not_abort_batch() {
    let store = seeded_store().await;
    let mut bad_args = propose_args();
    bad_args["sectionGeometry"] = outside_geojson();
    let provider = ScriptedProvider::returning_calls(vec![
        call("proposeSection", bad_args),
        call("imaginaryTool", json!({})),
        call("proposeSection", propose_args()),
        call("finalizePlan", json!({})),
    ]);
    let today = day("2026-08-24");

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    assert!(outcome.success);
    let plan = store.plan_for_date("farm-1", today).await.unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Pending);
}

#[tokio::test]
async fn test_provider_error_propagates() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::new(vec![Err(ProviderError::Api(
        "upstream overloaded".to_string(),
    ))]);

    let err = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(day("2026-08-24"))
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Provider(_)));
}

// ============================================================================
// Geometric validation
// ============================================================================

#[tokio::test]
async fn test_section_outside_boundary_rejected() {
    let store = seeded_store().await;
    let mut args = propose_args();
    args["sectionGeometry"] = outside_geojson();
    let provider = ScriptedProvider::returning_calls(vec![call("proposeSection", args)]);
    let sink = MemorySink::new();
    let today = day("2026-08-24");

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .with_trace(&sink)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    assert!(!outcome.plan_created);
    let boundary_error = sink.events().into_iter().any(|event| {
        matches!(event, TraceEvent::ToolError { message, .. }
            if message.contains("outside the paddock boundary"))
    });
    assert!(boundary_error);
}

#[tokio::test]
async fn test_overlapping_section_rejected() {
    let store = seeded_store().await;
    let today = day("2026-08-24");

    // Yesterday's approved plan already grazed the exact same section of p-b.
    let yesterday = day("2026-08-23");
    let prior_geometry = SectionPolygon::from_json_value(&section_geojson()).unwrap();
    let now = Local::now();
    let mut record = FarmRecord {
        paddocks: vec![paddock("p-a", 0.38, 5), paddock("p-b", 0.52, 30)],
        settings: Some(FarmSettings::default()),
        plans: Vec::new(),
    };
    record.plans.push(Plan {
        id: "plan-yesterday".to_string(),
        farm_id: "farm-1".to_string(),
        date: yesterday,
        target_paddock_id: "p-b".to_string(),
        section: Some(Section {
            id: "sec-yesterday".to_string(),
            date: yesterday,
            paddock_id: "p-b".to_string(),
            area_ha: prior_geometry.area_hectares(),
            centroid: prior_geometry.centroid_lnglat(),
            geometry: prior_geometry,
            avg_ndvi: None,
            justification: "prior day".to_string(),
        }),
        confidence: 0.6,
        reasoning: Vec::new(),
        status: PlanStatus::Approved,
        created_at: now,
        updated_at: now,
    });
    store.put_farm("farm-1", record).await;

    let provider = ScriptedProvider::returning_calls(vec![call("proposeSection", propose_args())]);
    let sink = MemorySink::new();

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .with_trace(&sink)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    assert!(!outcome.plan_created);
    let overlap_error = sink.events().into_iter().any(|event| {
        matches!(event, TraceEvent::ToolError { message, .. }
            if message.contains("overlaps a prior section"))
    });
    assert!(overlap_error);
}

#[tokio::test]
async fn test_nearly_contained_section_clipped_to_boundary() {
    let store = seeded_store().await;
    let mut args = propose_args();
    args["sectionGeometry"] = straddling_geojson();
    let provider = ScriptedProvider::returning_calls(vec![
        call("proposeSection", args),
        call("finalizePlan", json!({})),
    ]);
    let today = day("2026-08-24");

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    assert!(outcome.success);
    let plan = store.plan_for_date("farm-1", today).await.unwrap().unwrap();
    let stored = plan.section.unwrap();
    // The persisted polygon is the clipped piece, not the submitted one,
    // and it lies entirely inside the paddock.
    assert_ne!(stored.geometry.to_json_value(), straddling_geojson());
    assert!(stored.geometry.containment_fraction(&boundary()) > 0.999);
    assert!(stored.area_ha > 0.0);
}

#[tokio::test]
async fn test_small_overlap_with_prior_section_tolerated() {
    let store = seeded_store().await;
    let today = day("2026-08-24");
    let yesterday = day("2026-08-23");

    // Yesterday's section shares a 0.00005-wide strip with today's
    // proposal, about 2.5% of its area.
    let prior_geometry = SectionPolygon::from_rings(vec![vec![
        [148.00295, -34.999],
        [148.00495, -34.999],
        [148.00495, -34.997],
        [148.00295, -34.997],
        [148.00295, -34.999],
    ]])
    .unwrap();
    let now = Local::now();
    let mut record = FarmRecord {
        paddocks: vec![paddock("p-a", 0.38, 5), paddock("p-b", 0.52, 30)],
        settings: Some(FarmSettings::default()),
        plans: Vec::new(),
    };
    record.plans.push(Plan {
        id: "plan-yesterday".to_string(),
        farm_id: "farm-1".to_string(),
        date: yesterday,
        target_paddock_id: "p-b".to_string(),
        section: Some(Section {
            id: "sec-yesterday".to_string(),
            date: yesterday,
            paddock_id: "p-b".to_string(),
            area_ha: prior_geometry.area_hectares(),
            centroid: prior_geometry.centroid_lnglat(),
            geometry: prior_geometry,
            avg_ndvi: None,
            justification: "prior day".to_string(),
        }),
        confidence: 0.6,
        reasoning: Vec::new(),
        status: PlanStatus::Approved,
        created_at: now,
        updated_at: now,
    });
    store.put_farm("farm-1", record).await;

    let provider = ScriptedProvider::returning_calls(vec![
        call("proposeSection", propose_args()),
        call("finalizePlan", json!({})),
    ]);

    let outcome = DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    assert!(outcome.success);
    let plan = store.plan_for_date("farm-1", today).await.unwrap().unwrap();
    // Tolerated overlap leaves the submitted geometry untouched.
    assert_eq!(
        plan.section.unwrap().geometry.to_json_value(),
        section_geojson()
    );
}

#[tokio::test]
async fn test_confidence_on_percent_scale_normalized() {
    let store = seeded_store().await;
    let mut args = propose_args();
    args["confidence"] = json!(72);
    let provider = ScriptedProvider::returning_calls(vec![
        call("proposeSection", args),
        call("finalizePlan", json!({})),
    ]);
    let today = day("2026-08-24");

    DailyPlanner::new(&store, &provider, "scripted/model")
        .with_date(today)
        .run_daily_plan("farm-1", "Riverbend", Some("p-a"), FarmSettings::default())
        .await
        .unwrap();

    let plan = store.plan_for_date("farm-1", today).await.unwrap().unwrap();
    assert_eq!(plan.confidence, 0.72);
}
