//! WaveEngine — the RIPPLE loop.
//!
//! ```text
//! for wave in 0..max_waves:
//!   snapshot → verdict ──stop──→ done
//!                 │
//!                 ├─ wave 0: group guard
//!                 ├─ fan-out (ActivationCoordinator)
//!                 └─ memory update → WaveRecord appended
//! reached max_waves → safety cutoff
//! ```
//!
//! The ceiling is enforced here, not by the decision agent. A verdict can
//! only end the loop early.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use ripple_core::{
    AgentActivation, AgentKind, FieldSnapshot, HistoryWindow, OmniscientVerdict, ResponseType, Ripple,
    SnapshotParameters, WaveBudget, WaveEvent, WaveRecord,
};

use crate::activation::ActivationCoordinator;
use crate::context::RunContext;
use crate::decision::{DecisionAgent, InitResult, VerdictRequest};
use crate::error::RunResult;
use crate::events::ProgressEventKind;
use crate::participant::{ParticipantRegistry, VERDICT_SOURCE};
use crate::persistence::note_failure;

/// Activation reason attached by the wave-0 group guard.
pub const GROUP_GUARD_REASON: &str = "seed perturbation must reach at least one group agent";

const SEED_HISTORY_PREVIEW: usize = 50;

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// The decision agent asked to stop.
    Verdict { wave: u32, reason: String },
    /// The verdict call exhausted its retries; the safe stop verdict was used.
    VerdictFailed { wave: u32, reason: String },
    /// `max_waves` waves ran without a stop verdict.
    SafetyCutoff { max_waves: u32 },
}

impl StopReason {
    /// Whether the stop is a designed degradation rather than a verdict.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, Self::Verdict { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Verdict { wave, reason } => format!("stopped by verdict at wave {}: {}", wave, reason),
            Self::VerdictFailed { wave, reason } => format!("verdict failed at wave {}: {}", wave, reason),
            Self::SafetyCutoff { max_waves } => format!("safety cutoff after {} waves", max_waves),
        }
    }
}

/// Result of the RIPPLE phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RippleOutcome {
    pub records: Vec<WaveRecord>,
    pub stop: StopReason,
}

impl RippleOutcome {
    /// Waves actually recorded.
    pub fn effective_waves(&self) -> u32 {
        u32::try_from(self.records.len()).unwrap_or(u32::MAX)
    }
}

/// Per-run inputs the loop reads but never changes.
#[derive(Debug, Clone, Copy)]
pub struct RippleInputs<'a> {
    pub init: &'a InitResult,
    pub seed: &'a Ripple,
    pub budget: &'a WaveBudget,
    pub simulation_horizon: &'a str,
}

pub struct WaveEngine {
    decision: Arc<DecisionAgent>,
    coordinator: ActivationCoordinator,
    history: HistoryWindow,
    group_energy_factor: f64,
}

impl WaveEngine {
    pub fn new(
        decision: Arc<DecisionAgent>,
        coordinator: ActivationCoordinator,
        history_window: usize,
        group_energy_factor: f64,
    ) -> Self {
        Self {
            decision,
            coordinator,
            history: HistoryWindow::new(history_window),
            group_energy_factor,
        }
    }

    /// Run waves until a stop verdict or the ceiling.
    ///
    /// Only a budget stop escapes as an error; everything else ends in a
    /// `RippleOutcome` carrying the waves recorded so far.
    pub async fn run(
        &self,
        ctx: &RunContext,
        registry: &mut ParticipantRegistry,
        inputs: RippleInputs<'_>,
    ) -> RunResult<RippleOutcome> {
        let params = SnapshotParameters {
            wave_time_window: inputs.init.dynamic_parameters.wave_time_window.clone(),
            simulation_horizon: inputs.simulation_horizon.to_string(),
            energy_decay_per_wave: inputs.init.dynamic_parameters.energy_decay_per_wave,
        };
        let budget = inputs.budget;
        let mut records: Vec<WaveRecord> = Vec::new();

        info!(
            run_id = %ctx.run_id,
            estimated_waves = budget.estimated_waves,
            max_waves = budget.max_waves,
            "RIPPLE starting"
        );

        for wave in 0..budget.max_waves {
            let snapshot = self.snapshot(inputs, registry, &records, &params);
            note_failure(
                "record_wave_start",
                &ctx.run_id,
                ctx.persistence.record_wave_start(&ctx.run_id, wave, &snapshot).await,
            );
            let start = ctx
                .progress
                .event(ProgressEventKind::WaveStart, budget.fraction(wave))
                .with_wave(wave, budget.estimated_waves);
            ctx.progress.emit(start).await;

            let history = self.history_text(inputs.seed, &records);
            let outcome = self
                .decision
                .verdict(
                    ctx,
                    VerdictRequest {
                        wave,
                        snapshot: &snapshot,
                        history: &history,
                        wave_time_window: &params.wave_time_window,
                        simulation_horizon: &params.simulation_horizon,
                    },
                )
                .await?;
            let failed = outcome.is_degraded();
            let mut verdict = outcome.into_value();
            // The engine owns wave numbering.
            verdict.wave_number = wave;

            if !verdict.continue_propagation {
                let reason = verdict.stop_reason().to_string();
                if verdict.termination_reason.is_none() {
                    warn!(run_id = %ctx.run_id, wave, "Stop verdict gave no termination_reason; using default");
                }
                info!(run_id = %ctx.run_id, wave, reason = %reason, degraded = failed, "Propagation stopped");
                let terminal = WaveRecord {
                    wave_number: wave,
                    verdict,
                    responses: Default::default(),
                    events: Vec::new(),
                };
                note_failure(
                    "record_wave_end",
                    &ctx.run_id,
                    ctx.persistence
                        .record_wave_end(&ctx.run_id, &terminal, true, &snapshot)
                        .await,
                );
                let end = ctx
                    .progress
                    .event(ProgressEventKind::WaveEnd, budget.fraction(wave))
                    .with_wave(wave, budget.estimated_waves)
                    .with_detail(json!({ "terminated": true, "reason": reason }));
                ctx.progress.emit(end).await;

                let stop = if failed {
                    StopReason::VerdictFailed { wave, reason }
                } else {
                    StopReason::Verdict { wave, reason }
                };
                return Ok(RippleOutcome { records, stop });
            }

            let mut events = Vec::new();
            if wave == 0 {
                let seed_energy = inputs.seed.energy();
                if let Some(event) =
                    apply_group_guard(&mut verdict, registry, seed_energy * self.group_energy_factor)
                {
                    events.push(event);
                }
            }

            for activation in &verdict.activated_agents {
                if let Some(kind) = registry.kind_of(&activation.agent_id) {
                    let event = ctx
                        .progress
                        .event(ProgressEventKind::AgentActivated, budget.fraction(wave))
                        .with_wave(wave, budget.estimated_waves)
                        .with_agent(&activation.agent_id, kind)
                        .with_detail(json!({ "incoming_energy": activation.incoming_ripple_energy }));
                    ctx.progress.emit(event).await;
                }
            }

            let fan_out = self
                .coordinator
                .activate(registry, &verdict.activated_agents, inputs.seed)
                .await;
            events.extend(fan_out.events);

            for (agent_id, response) in &fan_out.responses {
                if let Some(kind) = registry.kind_of(agent_id) {
                    let event = ctx
                        .progress
                        .event(ProgressEventKind::AgentResponded, budget.fraction(wave))
                        .with_wave(wave, budget.estimated_waves)
                        .with_agent(agent_id, kind)
                        .with_detail(json!({
                            "response_type": response.response_type,
                            "outgoing_energy": response.outgoing_energy,
                        }));
                    ctx.progress.emit(event).await;
                }
            }

            // Memory is written only after every task of this wave has joined.
            let incoming: HashMap<&str, f64> = verdict
                .activated_agents
                .iter()
                .map(|a| (a.agent_id.as_str(), a.incoming_ripple_energy))
                .collect();
            for (agent_id, response) in &fan_out.responses {
                if response.response_type == ResponseType::Error {
                    continue;
                }
                let energy = incoming.get(agent_id.as_str()).copied().unwrap_or_default();
                if let Some(participant) = registry.get_mut(agent_id) {
                    participant.remember(inputs.seed, energy, VERDICT_SOURCE, response.response_type);
                }
            }

            let record = WaveRecord {
                wave_number: wave,
                verdict,
                responses: fan_out.responses,
                events,
            };
            debug!(
                run_id = %ctx.run_id,
                wave,
                responses = record.responses.len(),
                total_outgoing_energy = record.total_outgoing_energy(),
                "Wave complete"
            );
            records.push(record);

            let after = self.snapshot(inputs, registry, &records, &params);
            if let Some(record) = records.last() {
                note_failure(
                    "record_wave_end",
                    &ctx.run_id,
                    ctx.persistence
                        .record_wave_end(&ctx.run_id, record, false, &after)
                        .await,
                );
            }
            let end = ctx
                .progress
                .event(ProgressEventKind::WaveEnd, budget.fraction(wave + 1))
                .with_wave(wave, budget.estimated_waves);
            ctx.progress.emit(end).await;
        }

        warn!(
            run_id = %ctx.run_id,
            max_waves = budget.max_waves,
            estimated_waves = budget.estimated_waves,
            "Safety cutoff reached; ending propagation"
        );
        Ok(RippleOutcome {
            records,
            stop: StopReason::SafetyCutoff {
                max_waves: budget.max_waves,
            },
        })
    }

    fn snapshot(
        &self,
        inputs: RippleInputs<'_>,
        registry: &ParticipantRegistry,
        records: &[WaveRecord],
        params: &SnapshotParameters,
    ) -> FieldSnapshot {
        FieldSnapshot::build(
            inputs.seed,
            registry.snapshot_entries(),
            records,
            params,
            &inputs.init.topology,
        )
    }

    fn history_text(&self, seed: &Ripple, records: &[WaveRecord]) -> String {
        let seed_line = format!(
            "Seed ripple injected: '{}', energy={:.2}",
            seed.preview(SEED_HISTORY_PREVIEW),
            seed.energy()
        );
        let waves = self.history.render(records);
        if waves.is_empty() {
            seed_line
        } else {
            format!("{}\n{}", seed_line, waves)
        }
    }
}

/// Make sure the first wave reaches a group agent.
///
/// When the verdict activates no registered sea and at least one sea exists,
/// the first registered sea is added at `energy`. Returns the event to
/// record, or `None` when nothing was injected.
pub fn apply_group_guard(
    verdict: &mut OmniscientVerdict,
    registry: &ParticipantRegistry,
    energy: f64,
) -> Option<WaveEvent> {
    let reaches_group = verdict
        .activated_agents
        .iter()
        .any(|a| registry.kind_of(&a.agent_id) == Some(AgentKind::Sea));
    if reaches_group {
        return None;
    }
    let group = registry.first_of_kind(AgentKind::Sea)?;
    let agent_id = group.id().to_string();
    info!(agent_id = %agent_id, energy, "Wave 0 reached no group agent; injecting one");
    verdict
        .activated_agents
        .push(AgentActivation::new(agent_id.clone(), energy, GROUP_GUARD_REASON));
    Some(WaveEvent::GroupGuardInjected { agent_id, energy })
}
