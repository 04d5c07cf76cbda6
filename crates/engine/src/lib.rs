//! Daily grazing-plan decision engine.
//!
//! One run per farm per trigger: assemble farm context, pick the target
//! paddock deterministically, brief the generative capability, then
//! validate and persist whatever sections it proposes through the two-tool
//! protocol. The caller owns retries and anything user-facing.

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::info;

pub mod brief;
pub mod context;
pub mod orchestrator;
pub mod policy;
pub mod trace;

pub use context::{ContextAssembler, FarmContext};
pub use orchestrator::{GeometryOrchestrator, RunOutcome, RunState, ToolError};
pub use policy::{Recommendation, Selection};
pub use trace::{MemorySink, NoopSink, TraceEvent, TraceSink};

use openpasture_provider::Provider;
use openpasture_store::{FarmSettings, PaddockRead, PlanWrite};

#[derive(Error, Debug)]
pub enum EngineError {
    /// Defect signal, not a business outcome. Aborts the run.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Store(#[from] openpasture_store::StoreError),

    #[error(transparent)]
    Provider(#[from] openpasture_provider::ProviderError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Caller-facing entry point wiring the pipeline together.
pub struct DailyPlanner<'a, S> {
    store: &'a S,
    provider: &'a dyn Provider,
    trace: &'a dyn TraceSink,
    model: String,
    date: Option<NaiveDate>,
}

impl<'a, S: PaddockRead + PlanWrite> DailyPlanner<'a, S> {
    pub fn new(store: &'a S, provider: &'a dyn Provider, model: impl Into<String>) -> Self {
        Self {
            store,
            provider,
            trace: &NoopSink,
            model: model.into(),
            date: None,
        }
    }

    pub fn with_trace(mut self, trace: &'a dyn TraceSink) -> Self {
        self.trace = trace;
        self
    }

    /// Plan for a specific date instead of today. Used by tests and replays.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub async fn run_daily_plan(
        &self,
        farm_id: &str,
        farm_name: &str,
        current_paddock_id: Option<&str>,
        settings: FarmSettings,
    ) -> Result<RunOutcome> {
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        info!(farm_id, farm_name, date = %date, "starting daily plan run");

        let assembler = ContextAssembler::new(self.store);
        let context = assembler
            .assemble(farm_id, current_paddock_id, date, settings)
            .await?;

        let selection = policy::select_target(
            context.current.as_ref(),
            &context.paddocks,
            settings.min_ndvi_threshold,
        )?;
        info!(
            target = %selection.target.external_id,
            recommendation = %selection.recommendation,
            confidence = selection.confidence,
            "target paddock selected"
        );
        self.trace.record(TraceEvent::Decision {
            target_paddock_id: selection.target.external_id.clone(),
            recommendation: selection.recommendation.to_string(),
            confidence: selection.confidence,
        });

        // The context holds the current paddock's history; the brief and
        // the overlap checks need the target's.
        let target_sections = match &context.current {
            Some(current) if current.external_id == selection.target.external_id => {
                context.prior_sections.clone()
            }
            _ => {
                self.store
                    .prior_sections(farm_id, &selection.target.external_id, date)
                    .await?
            }
        };

        let brief = brief::BriefBuilder {
            farm_name,
            context: &context,
            selection: &selection,
            target_sections: &target_sections,
        }
        .build();
        self.trace.record(TraceEvent::PromptPrepared {
            farm_id: farm_id.to_string(),
            brief_chars: brief.len(),
        });

        let orchestrator = GeometryOrchestrator::new(self.store, self.trace);
        let outcome = orchestrator
            .execute(
                self.provider,
                &self.model,
                &brief::system_persona(),
                &brief,
                &context,
                &selection,
                &target_sections,
            )
            .await?;

        info!(
            success = outcome.success,
            plan_created = outcome.plan_created,
            plan_finalized = outcome.plan_finalized,
            plan_id = outcome.plan_id.as_deref().unwrap_or("-"),
            "daily plan run finished"
        );
        Ok(outcome)
    }
}
