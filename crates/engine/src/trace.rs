//! Optional structured trace events emitted while a run executes.
//!
//! Tracing here is operational tooling only; the engine is correct with the
//! no-op sink installed.

use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    PromptPrepared {
        farm_id: String,
        brief_chars: usize,
    },
    Decision {
        target_paddock_id: String,
        recommendation: String,
        confidence: f64,
    },
    ToolCall {
        name: String,
    },
    ToolError {
        name: String,
        message: String,
    },
    DraftCreated {
        plan_id: String,
    },
    PlanFinalized {
        plan_id: String,
    },
    RunComplete {
        success: bool,
        plan_created: bool,
        plan_finalized: bool,
    },
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent);
}

/// Discards every event.
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn record(&self, _event: TraceEvent) {}
}

/// Collects events for inspection in tests.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl TraceSink for MemorySink {
    fn record(&self, event: TraceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
