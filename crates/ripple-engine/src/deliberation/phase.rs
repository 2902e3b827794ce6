//! DELIBERATE as an extra phase.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use ripple_core::EvidencePack;

use super::orchestrator::{DeliberationOrchestrator, DeliberationSummary};
use crate::error::PhaseError;
use crate::phase::{ExtraPhase, PhaseContext, PhaseHandler};

pub const DELIBERATE_PHASE: &str = "DELIBERATE";
pub const DELIBERATE_ANCHOR: &str = "RIPPLE";
pub const DELIBERATE_WEIGHT: f64 = 0.15;

/// Runs the tribunal over the run's evidence pack.
///
/// Output:
/// `{"deliberation_records": [...], "deliberation_summary": {...}}`.
pub struct DeliberationPhase {
    orchestrator: DeliberationOrchestrator,
}

impl DeliberationPhase {
    pub fn new(orchestrator: DeliberationOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Register after RIPPLE with the default weight.
    pub fn into_extra(self) -> ExtraPhase {
        ExtraPhase::new(DELIBERATE_PHASE, DELIBERATE_ANCHOR, DELIBERATE_WEIGHT, Arc::new(self))
    }
}

#[async_trait]
impl PhaseHandler for DeliberationPhase {
    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<Value, PhaseError> {
        // Anchored before RIPPLE there is no pack yet; deliberate over an empty one.
        let fallback;
        let evidence = match ctx.evidence_pack {
            Some(pack) => pack,
            None => {
                fallback = EvidencePack::from_wave_records(ctx.wave_records);
                &fallback
            }
        };
        info!(run_id = %ctx.run_id(), signals = evidence.key_signals.len(), "DELIBERATE starting");

        let outcome = self.orchestrator.run(evidence).await;
        let summary = DeliberationSummary::from_records(outcome.value());
        let mut output = json!({
            "deliberation_records": outcome.value(),
            "deliberation_summary": summary,
        });
        if let (Some(reason), Value::Object(map)) = (outcome.reason(), &mut output) {
            map.insert("degraded_reason".to_string(), json!(reason));
        }
        Ok(output)
    }
}
