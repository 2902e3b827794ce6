//! PhaseOrchestrator — drives one full run through the phase plan.
//!
//! ## Lifecycle
//!
//! ```text
//! PhaseOrchestrator::run(input)
//!   → INIT        three decision-agent calls; failure ends the run
//!   → SEED        root ripple from INIT's seed spec
//!   → RIPPLE      WaveEngine loop (budgeted, guarded, capped)
//!   → OBSERVE     macro-state classification (degrades to "unknown")
//!   → SYNTHESIZE  final prediction (degrades to an error-tagged default)
//!   → extras      each right after its anchor; failures degrade
//! ```
//!
//! Every phase emits `phase_start`/`phase_end`; progress is monotone across
//! the whole run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use ripple_core::{
    EvidencePack, FieldSnapshot, HistoryWindow, Outcome, Ripple, SnapshotParameters, WaveBudget,
    WaveRecord,
};

use super::plan::{BuiltinPhase, ExtraPhase, PhasePlan, PlanSlot};
use super::{PhaseContext, PhaseHandler, PhaseTiming};
use crate::activation::ActivationCoordinator;
use crate::budget::BudgetGuard;
use crate::caller::AgentCaller;
use crate::config::EngineConfig;
use crate::context::{new_run_id, RunContext};
use crate::decision::{DecisionAgent, InitResult};
use crate::error::{RunError, RunResult};
use crate::events::{ProgressEventKind, ProgressSink};
use crate::input::SimulationInput;
use crate::participant::ParticipantRegistry;
use crate::persistence::{note_failure, PersistenceSink};
use crate::wave::{RippleInputs, RippleOutcome, StopReason, WaveEngine};

// ── Report ──────────────────────────────────────────────────────────────────

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub init: InitResult,
    pub wave_budget: WaveBudget,
    pub ripple: RippleOutcome,
    pub observation: Outcome<Value>,
    pub synthesis: Outcome<Value>,
    /// Extra-phase outputs keyed by phase name.
    pub phase_outputs: BTreeMap<String, Outcome<Value>>,
    pub phase_timings: Vec<PhaseTiming>,
}

impl RunReport {
    /// Waves actually recorded.
    pub fn total_waves(&self) -> u32 {
        self.ripple.effective_waves()
    }

    pub fn wave_records(&self) -> &[WaveRecord] {
        &self.ripple.records
    }

    pub fn stop_reason(&self) -> &StopReason {
        &self.ripple.stop
    }

    /// Whether any phase fell back to a safe default.
    pub fn is_degraded(&self) -> bool {
        self.ripple.stop.is_degraded()
            || self.observation.is_degraded()
            || self.synthesis.is_degraded()
            || self.phase_outputs.values().any(Outcome::is_degraded)
    }

    /// Flat result object: the synthesis payload plus the observation, run
    /// metadata, and each extra phase's output under its lowercased name.
    pub fn result_json(&self) -> Value {
        let mut obj = match self.synthesis.value() {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("prediction".to_string(), other.clone());
                map
            }
        };
        obj.insert("observation".to_string(), self.observation.value().clone());
        obj.insert("total_waves".to_string(), json!(self.total_waves()));
        obj.insert("wave_records_count".to_string(), json!(self.ripple.records.len()));
        obj.insert("run_id".to_string(), json!(self.run_id));
        for (name, output) in &self.phase_outputs {
            obj.insert(name.to_lowercase(), output.value().clone());
        }
        Value::Object(obj)
    }
}

/// Anything that can execute one full run. Implemented by
/// `PhaseOrchestrator`; ensembles are written against this trait.
#[async_trait]
pub trait SimulationRunner: Send + Sync {
    async fn run_simulation(
        &self,
        input: &SimulationInput,
        run_id: Option<&str>,
        seed: Option<u64>,
    ) -> RunResult<RunReport>;
}

// ── Builder ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct PhaseOrchestratorBuilder {
    config: EngineConfig,
    decision_caller: Option<Arc<dyn AgentCaller>>,
    participant_caller: Option<Arc<dyn AgentCaller>>,
    decision_profile: String,
    participant_profile: String,
    budget: Option<Arc<dyn BudgetGuard>>,
    progress: Option<Arc<dyn ProgressSink>>,
    persistence: Option<Arc<dyn PersistenceSink>>,
    extras: Vec<ExtraPhase>,
}

impl PhaseOrchestratorBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn decision_caller(mut self, caller: Arc<dyn AgentCaller>) -> Self {
        self.decision_caller = Some(caller);
        self
    }

    pub fn participant_caller(mut self, caller: Arc<dyn AgentCaller>) -> Self {
        self.participant_caller = Some(caller);
        self
    }

    /// Skill profile layered under every decision-agent phase prompt.
    pub fn decision_profile(mut self, profile: impl Into<String>) -> Self {
        self.decision_profile = profile.into();
        self
    }

    /// Skill profile layered under every participant prompt.
    pub fn participant_profile(mut self, profile: impl Into<String>) -> Self {
        self.participant_profile = profile.into();
        self
    }

    pub fn budget(mut self, budget: Arc<dyn BudgetGuard>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn persistence(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = Some(sink);
        self
    }

    /// Register an extra phase. Validation happens in `build`.
    pub fn extra_phase(mut self, extra: ExtraPhase) -> Self {
        self.extras.push(extra);
        self
    }

    pub fn build(self) -> RunResult<PhaseOrchestrator> {
        let decision_caller = self
            .decision_caller
            .ok_or_else(|| RunError::InvalidConstruction("decision caller is required".to_string()))?;
        let participant_caller = self
            .participant_caller
            .ok_or_else(|| RunError::InvalidConstruction("participant caller is required".to_string()))?;
        self.config.validate().map_err(RunError::InvalidConstruction)?;
        let plan = PhasePlan::build(self.extras)?;

        let config = Arc::new(self.config);
        let decision = Arc::new(DecisionAgent::new(
            decision_caller,
            self.decision_profile,
            config.decision_max_retries,
        ));
        let coordinator = ActivationCoordinator::new(
            participant_caller,
            config.participant_max_retries,
            config.max_parallel_participants,
        )
        .with_profile(self.participant_profile);
        let waves = WaveEngine::new(
            decision.clone(),
            coordinator,
            config.history_window,
            config.wave0_group_energy_factor,
        );

        Ok(PhaseOrchestrator {
            config,
            decision,
            waves,
            plan,
            budget: self.budget,
            progress: self.progress,
            persistence: self.persistence,
        })
    }
}

// ── Orchestrator ────────────────────────────────────────────────────────────

pub struct PhaseOrchestrator {
    config: Arc<EngineConfig>,
    decision: Arc<DecisionAgent>,
    waves: WaveEngine,
    plan: PhasePlan,
    budget: Option<Arc<dyn BudgetGuard>>,
    progress: Option<Arc<dyn ProgressSink>>,
    persistence: Option<Arc<dyn PersistenceSink>>,
}

/// Single-writer state for one run.
#[derive(Default)]
struct RunState {
    init: Option<InitResult>,
    wave_budget: Option<WaveBudget>,
    registry: ParticipantRegistry,
    seed: Option<Ripple>,
    ripple: Option<RippleOutcome>,
    evidence: Option<EvidencePack>,
    observation: Option<Outcome<Value>>,
    synthesis: Option<Outcome<Value>>,
    phase_outputs: BTreeMap<String, Outcome<Value>>,
    timings: Vec<PhaseTiming>,
}

impl RunState {
    fn records(&self) -> &[WaveRecord] {
        self.ripple.as_ref().map(|r| r.records.as_slice()).unwrap_or_default()
    }
}

fn missing(what: &str, phase: &str) -> RunError {
    RunError::InvalidConstruction(format!("{} is not available in {}", what, phase))
}

impl PhaseOrchestrator {
    pub fn builder() -> PhaseOrchestratorBuilder {
        PhaseOrchestratorBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plan(&self) -> &PhasePlan {
        &self.plan
    }

    /// Run the full plan. A run id is generated when none is given.
    pub async fn run(&self, input: &SimulationInput, run_id: Option<&str>) -> RunResult<RunReport> {
        self.run_with_seed(input, run_id, None).await
    }

    pub async fn run_with_seed(
        &self,
        input: &SimulationInput,
        run_id: Option<&str>,
        seed: Option<u64>,
    ) -> RunResult<RunReport> {
        let run_id = run_id.map(str::to_string).unwrap_or_else(new_run_id);
        let ctx = self.context(&run_id, seed);
        info!(run_id = %run_id, phases = ?self.plan.names(), "Run starting");

        let started = Instant::now();
        let mut state = RunState::default();
        for entry in self.plan.entries() {
            ctx.progress.enter(&entry.name, entry.offset, entry.weight);
            ctx.progress.report(ProgressEventKind::PhaseStart, 0.0).await;
            let phase_started = Instant::now();

            let result = match &entry.slot {
                PlanSlot::Builtin(phase) => self.run_builtin(*phase, &ctx, input, &mut state).await,
                PlanSlot::Extra(handler) => {
                    self.run_extra(&entry.name, handler.as_ref(), &ctx, input, &mut state)
                        .await
                }
            };
            let degraded = match result {
                Ok(degraded) => degraded,
                Err(e) => {
                    error!(run_id = %run_id, phase = %entry.name, error = %e, "Run failed");
                    let event = ctx
                        .progress
                        .event(ProgressEventKind::Error, 0.0)
                        .with_detail(json!({ "error": e.to_string(), "category": e.retry_category().to_string() }));
                    ctx.progress.emit(event).await;
                    return Err(e);
                }
            };

            state.timings.push(PhaseTiming {
                phase: entry.name.clone(),
                started_ms: phase_started.duration_since(started).as_millis() as u64,
                elapsed_ms: phase_started.elapsed().as_millis() as u64,
                degraded,
            });
            let mut end = ctx.progress.event(ProgressEventKind::PhaseEnd, 1.0);
            if let Some(budget) = &state.wave_budget {
                end = end.with_total_waves(budget.estimated_waves);
            }
            ctx.progress.emit(end).await;
        }

        let report = RunReport {
            run_id: run_id.clone(),
            seed,
            init: state.init.ok_or_else(|| missing("INIT result", "report"))?,
            wave_budget: state.wave_budget.ok_or_else(|| missing("wave budget", "report"))?,
            ripple: state.ripple.ok_or_else(|| missing("RIPPLE outcome", "report"))?,
            observation: state.observation.ok_or_else(|| missing("observation", "report"))?,
            synthesis: state.synthesis.ok_or_else(|| missing("synthesis", "report"))?,
            phase_outputs: state.phase_outputs,
            phase_timings: state.timings,
        };
        info!(
            run_id = %run_id,
            total_waves = report.total_waves(),
            degraded = report.is_degraded(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run complete"
        );
        Ok(report)
    }

    fn context(&self, run_id: &str, seed: Option<u64>) -> RunContext {
        let mut ctx = RunContext::new(run_id, self.config.clone())
            .with_progress_sink(self.progress.clone())
            .with_seed(seed);
        if let Some(budget) = &self.budget {
            ctx = ctx.with_budget(budget.clone());
        }
        if let Some(persistence) = &self.persistence {
            ctx = ctx.with_persistence(persistence.clone());
        }
        ctx
    }

    /// Returns whether the phase degraded.
    async fn run_builtin(
        &self,
        phase: BuiltinPhase,
        ctx: &RunContext,
        input: &SimulationInput,
        state: &mut RunState,
    ) -> RunResult<bool> {
        match phase {
            BuiltinPhase::Init => {
                let init = self.decision.init(ctx, input).await?;
                let dp = &init.dynamic_parameters;
                let estimate = dp
                    .estimated_total_waves
                    .or(Some(i64::from(self.config.default_estimated_waves)));
                let budget = WaveBudget::compute(
                    &input.simulation_horizon(),
                    &dp.wave_time_window,
                    estimate,
                    self.config.safety_wave_multiplier,
                );
                info!(
                    run_id = %ctx.run_id,
                    stars = init.star_configs.len(),
                    seas = init.sea_configs.len(),
                    estimated_waves = budget.estimated_waves,
                    max_waves = budget.max_waves,
                    "INIT complete"
                );
                note_failure(
                    "record_init",
                    &ctx.run_id,
                    ctx.persistence.record_init(&ctx.run_id, &init, &budget).await,
                );
                state.registry =
                    ParticipantRegistry::from_descriptors(init.agents(), self.config.participant_memory_window);
                state.init = Some(init);
                state.wave_budget = Some(budget);
                Ok(false)
            }
            BuiltinPhase::Seed => {
                let init = state.init.as_ref().ok_or_else(|| missing("INIT result", "SEED"))?;
                let spec = &init.seed_ripple;
                let seed = Ripple::seed(&ctx.run_id, spec.content.clone(), spec.initial_energy);
                info!(run_id = %ctx.run_id, ripple_id = %seed.id(), energy = seed.energy(), "Seed ripple created");
                note_failure(
                    "record_seed",
                    &ctx.run_id,
                    ctx.persistence.record_seed(&ctx.run_id, &seed).await,
                );
                state.seed = Some(seed);
                Ok(false)
            }
            BuiltinPhase::Ripple => {
                let init = state.init.as_ref().ok_or_else(|| missing("INIT result", "RIPPLE"))?;
                let seed = state.seed.as_ref().ok_or_else(|| missing("seed ripple", "RIPPLE"))?;
                let budget = state
                    .wave_budget
                    .as_ref()
                    .ok_or_else(|| missing("wave budget", "RIPPLE"))?;
                let horizon = input.simulation_horizon();
                let outcome = self
                    .waves
                    .run(
                        ctx,
                        &mut state.registry,
                        RippleInputs {
                            init,
                            seed,
                            budget,
                            simulation_horizon: &horizon,
                        },
                    )
                    .await?;
                info!(
                    run_id = %ctx.run_id,
                    effective_waves = outcome.effective_waves(),
                    stop = %outcome.stop.describe(),
                    "RIPPLE complete"
                );
                let degraded = outcome.stop.is_degraded();
                state.evidence = Some(EvidencePack::from_wave_records(&outcome.records));
                state.ripple = Some(outcome);
                Ok(degraded)
            }
            BuiltinPhase::Observe => {
                let snapshot = self.final_snapshot(input, state, "OBSERVE")?;
                let history = HistoryWindow::render_full(state.records());
                let observation = self.decision.observe(ctx, &snapshot, &history).await?;
                note_failure(
                    "record_observation",
                    &ctx.run_id,
                    ctx.persistence.record_observation(&ctx.run_id, &observation).await,
                );
                let degraded = observation.is_degraded();
                state.observation = Some(observation);
                Ok(degraded)
            }
            BuiltinPhase::Synthesize => {
                let snapshot = self.final_snapshot(input, state, "SYNTHESIZE")?;
                let observation = state
                    .observation
                    .as_ref()
                    .map(|o| o.value().clone())
                    .unwrap_or(Value::Null);
                let synthesis = self
                    .decision
                    .synthesize(ctx, &snapshot, &observation, input)
                    .await?;
                note_failure(
                    "record_synthesis",
                    &ctx.run_id,
                    ctx.persistence.record_synthesis(&ctx.run_id, &synthesis).await,
                );
                let degraded = synthesis.is_degraded();
                state.synthesis = Some(synthesis);
                Ok(degraded)
            }
        }
    }

    fn final_snapshot(
        &self,
        input: &SimulationInput,
        state: &RunState,
        phase: &str,
    ) -> RunResult<FieldSnapshot> {
        let init = state.init.as_ref().ok_or_else(|| missing("INIT result", phase))?;
        let seed = state.seed.as_ref().ok_or_else(|| missing("seed ripple", phase))?;
        let params = SnapshotParameters {
            wave_time_window: init.dynamic_parameters.wave_time_window.clone(),
            simulation_horizon: input.simulation_horizon(),
            energy_decay_per_wave: init.dynamic_parameters.energy_decay_per_wave,
        };
        Ok(FieldSnapshot::build(
            seed,
            state.registry.snapshot_entries(),
            state.records(),
            &params,
            &init.topology,
        ))
    }

    async fn run_extra(
        &self,
        name: &str,
        handler: &dyn PhaseHandler,
        ctx: &RunContext,
        input: &SimulationInput,
        state: &mut RunState,
    ) -> RunResult<bool> {
        let phase_ctx = PhaseContext {
            run: ctx,
            phase: name,
            input,
            init: state.init.as_ref(),
            seed: state.seed.as_ref(),
            wave_records: state.records(),
            evidence_pack: state.evidence.as_ref(),
            observation: state.observation.as_ref().map(Outcome::value),
            phase_outputs: &state.phase_outputs,
        };
        let output = match handler.run(&phase_ctx).await {
            Ok(value) => Outcome::ok(value),
            Err(e) => {
                warn!(run_id = %ctx.run_id, phase = name, error = %e, "Extra phase failed; recording degraded output");
                Outcome::degraded(json!({ "error": e.to_string() }), e.to_string())
            }
        };
        note_failure(
            "record_phase_output",
            &ctx.run_id,
            ctx.persistence
                .record_phase_output(&ctx.run_id, name, &output)
                .await,
        );
        let degraded = output.is_degraded();
        state.phase_outputs.insert(name.to_string(), output);
        Ok(degraded)
    }
}

#[async_trait]
impl SimulationRunner for PhaseOrchestrator {
    async fn run_simulation(
        &self,
        input: &SimulationInput,
        run_id: Option<&str>,
        seed: Option<u64>,
    ) -> RunResult<RunReport> {
        self.run_with_seed(input, run_id, seed).await
    }
}
