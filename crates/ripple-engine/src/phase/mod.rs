//! Named-phase orchestration.
//!
//! A run is an ordered list of phases, each owning a slice of the overall
//! progress range. The five built-in phases always run in order:
//!
//! ```text
//! INIT(.05) → SEED(.05) → RIPPLE(.70) → OBSERVE(.10) → SYNTHESIZE(.10)
//! ```
//!
//! Extra phases are registered with an anchor and run immediately after it.
//! Weights are rebalanced so the whole plan still sums to 1.

pub mod orchestrator;
pub mod plan;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ripple_core::{EvidencePack, Outcome, Ripple, WaveRecord};

use crate::context::RunContext;
use crate::decision::InitResult;
use crate::error::PhaseError;
use crate::input::SimulationInput;

pub use orchestrator::{PhaseOrchestrator, PhaseOrchestratorBuilder, RunReport, SimulationRunner};
pub use plan::{BuiltinPhase, ExtraPhase, PhasePlan, PlanEntry, PlanSlot};

/// Everything an extra phase may read. Built fresh for each handler call.
pub struct PhaseContext<'a> {
    pub run: &'a RunContext,
    pub phase: &'a str,
    pub input: &'a SimulationInput,
    pub init: Option<&'a InitResult>,
    pub seed: Option<&'a Ripple>,
    /// Empty until RIPPLE has run.
    pub wave_records: &'a [WaveRecord],
    /// Present once RIPPLE has run.
    pub evidence_pack: Option<&'a EvidencePack>,
    pub observation: Option<&'a Value>,
    /// Outputs of extra phases that already ran.
    pub phase_outputs: &'a BTreeMap<String, Outcome<Value>>,
}

impl PhaseContext<'_> {
    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }
}

/// A registered extra phase.
///
/// Returning an error does not abort the run: the orchestrator logs it and
/// records a degraded `{"error": ...}` output under the phase name.
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<Value, PhaseError>;
}

/// Wall-clock record of one executed phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: String,
    /// Milliseconds since the run started.
    pub started_ms: u64,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub degraded: bool,
}
