//! Decision agent: the one full-context role.
//!
//! It configures the run (INIT), rules on every wave, observes the macro
//! state and synthesizes the final prediction. All of its calls share one
//! retry policy and are checked against the call budget. Only INIT failure
//! escapes; every other call degrades to a documented safe default.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use ripple_core::{
    coerce, extract_json_object, require_fields, AgentDescriptor, AgentKind, FieldSnapshot,
    OmniscientVerdict, Outcome, ParseError, ParseResult, RetryPolicy, TimeProgress,
};

use crate::caller::{call_with_retry, AgentCaller, CallRequest, Exhausted};
use crate::context::RunContext;
use crate::error::{RunError, RunResult};
use crate::input::SimulationInput;
use crate::prompts;

// ── INIT result ─────────────────────────────────────────────────────────

/// Time dynamics chosen by INIT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicParameters {
    pub wave_time_window: String,
    pub energy_decay_per_wave: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_total_waves: Option<i64>,
    /// Anything else the model said about the dynamics.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSpec {
    pub content: String,
    pub initial_energy: f64,
}

/// Merged output of the three INIT sub-calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitResult {
    pub dynamic_parameters: DynamicParameters,
    pub star_configs: Vec<AgentDescriptor>,
    pub sea_configs: Vec<AgentDescriptor>,
    pub topology: Value,
    pub seed_ripple: SeedSpec,
}

impl InitResult {
    /// Stars first, then seas, each in the order INIT listed them.
    pub fn agents(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.star_configs.iter().chain(self.sea_configs.iter())
    }
}

fn parse_dynamics(raw: &str, default_decay: f64) -> ParseResult<DynamicParameters> {
    let mut obj = extract_json_object(raw)?;
    require_fields(&obj, &["wave_time_window"])?;
    let wave_time_window = coerce::as_window(obj.remove("wave_time_window").as_ref());
    let energy_decay_per_wave = coerce::clamp_unit(coerce::as_f64(
        obj.remove("energy_decay_per_wave").as_ref(),
        default_decay,
    ));
    let estimated_total_waves = obj
        .remove("estimated_total_waves")
        .as_ref()
        .and_then(coerce::try_i64);
    Ok(DynamicParameters {
        wave_time_window,
        energy_decay_per_wave,
        estimated_total_waves,
        extra: obj,
    })
}

fn parse_agent_list(
    obj: &Map<String, Value>,
    field: &str,
    kind: AgentKind,
    seen: &mut HashSet<String>,
) -> ParseResult<Vec<AgentDescriptor>> {
    let entries = obj
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::invalid(field, "must be a list"))?;
    if entries.is_empty() {
        return Err(ParseError::invalid(field, "must not be empty"));
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let id = coerce::as_text(entry.get("id")).trim().to_string();
            if id.is_empty() {
                return Err(ParseError::invalid(format!("{}[{}].id", field, i), "missing agent id"));
            }
            if !seen.insert(id.clone()) {
                return Err(ParseError::invalid(
                    format!("{}[{}].id", field, i),
                    format!("duplicate agent id '{}'", id),
                ));
            }
            Ok(AgentDescriptor {
                id,
                kind,
                description: coerce::as_text(entry.get("description")),
            })
        })
        .collect()
}

fn parse_agents(raw: &str) -> ParseResult<(Vec<AgentDescriptor>, Vec<AgentDescriptor>)> {
    let obj = extract_json_object(raw)?;
    require_fields(&obj, &["star_configs", "sea_configs"])?;
    let mut seen = HashSet::new();
    let stars = parse_agent_list(&obj, "star_configs", AgentKind::Star, &mut seen)?;
    let seas = parse_agent_list(&obj, "sea_configs", AgentKind::Sea, &mut seen)?;
    Ok((stars, seas))
}

fn parse_topology(raw: &str, default_energy: f64) -> ParseResult<(Value, SeedSpec)> {
    let mut obj = extract_json_object(raw)?;
    require_fields(&obj, &["topology", "seed_ripple"])?;
    let seed = obj.remove("seed_ripple").unwrap_or(Value::Null);
    if !seed.is_object() {
        return Err(ParseError::invalid("seed_ripple", "must be an object"));
    }
    let seed = SeedSpec {
        content: coerce::as_text(seed.get("content")),
        initial_energy: coerce::clamp_unit(coerce::as_f64(seed.get("initial_energy"), default_energy)),
    };
    let topology = obj.remove("topology").unwrap_or(Value::Null);
    Ok((topology, seed))
}

// ── Safe defaults ───────────────────────────────────────────────────────

/// OBSERVE result used once retries are exhausted.
pub fn default_observation() -> Value {
    json!({
        "phase_vector": {"heat": "unknown", "sentiment": "unknown", "coherence": "unknown"},
        "phase_transition_detected": false,
        "emergence_events": [],
        "topology_recommendations": [],
    })
}

/// SYNTHESIZE result used once retries are exhausted.
pub fn default_synthesis(error: &str) -> Value {
    json!({
        "prediction": {"error": error},
        "timeline": [],
        "bifurcation_points": [],
        "agent_insights": {},
    })
}

// ── Agent ───────────────────────────────────────────────────────────────

/// Inputs for one verdict call.
#[derive(Debug, Clone, Copy)]
pub struct VerdictRequest<'a> {
    pub wave: u32,
    pub snapshot: &'a FieldSnapshot,
    pub history: &'a str,
    pub wave_time_window: &'a str,
    pub simulation_horizon: &'a str,
}

pub struct DecisionAgent {
    caller: Arc<dyn AgentCaller>,
    base_profile: String,
    policy: RetryPolicy,
}

impl DecisionAgent {
    pub fn new(caller: Arc<dyn AgentCaller>, base_profile: impl Into<String>, max_retries: u32) -> Self {
        Self {
            caller,
            base_profile: base_profile.into(),
            policy: RetryPolicy::new(max_retries),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn call<T, F>(
        &self,
        ctx: &RunContext,
        label: &str,
        phase_system: &str,
        user_prompt: &str,
        decode: F,
    ) -> RunResult<Result<T, Exhausted>>
    where
        F: Fn(&str) -> ParseResult<T>,
    {
        let system_prompt = prompts::layer(&self.base_profile, phase_system);
        let request = CallRequest {
            label,
            system_prompt: &system_prompt,
            user_prompt,
        };
        call_with_retry(
            self.caller.as_ref(),
            request,
            self.policy,
            Some(ctx.budget.as_ref()),
            decode,
        )
        .await
    }

    async fn init_step<T, F>(
        &self,
        ctx: &RunContext,
        step: &str,
        phase_system: &str,
        user_prompt: &str,
        decode: F,
    ) -> RunResult<T>
    where
        F: Fn(&str) -> ParseResult<T>,
    {
        let label = format!("INIT:{}", step);
        info!(run_id = %ctx.run_id, step, "INIT sub-call");
        match self.call(ctx, &label, phase_system, user_prompt, decode).await? {
            Ok(value) => Ok(value),
            Err(exhausted) => {
                error!(
                    run_id = %ctx.run_id,
                    step,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "INIT sub-call exhausted retries"
                );
                Err(RunError::Configuration {
                    step: step.to_string(),
                    attempts: exhausted.attempts,
                    last_error: exhausted.last_error.to_string(),
                })
            }
        }
    }

    /// Configure the run with three focused calls: dynamics, agent
    /// population, then topology and seed.
    pub async fn init(&self, ctx: &RunContext, input: &SimulationInput) -> RunResult<InitResult> {
        let input_json = input.to_pretty_json();
        let horizon = input.simulation_horizon();

        let mut dynamics_system = prompts::INIT_DYNAMICS_SYSTEM.to_string();
        if !horizon.is_empty() {
            dynamics_system.push_str(&prompts::init_dynamics_horizon_line(&horizon));
        }
        let default_decay = ctx.config.default_energy_decay;
        let dynamic_parameters = self
            .init_step(
                ctx,
                "dynamics",
                &dynamics_system,
                &format!("## Simulation input\n{}", input_json),
                |raw| parse_dynamics(raw, default_decay),
            )
            .await?;

        let dp_json = serde_json::to_string_pretty(&dynamic_parameters).unwrap_or_default();
        let (star_configs, sea_configs) = self
            .init_step(
                ctx,
                "agents",
                prompts::INIT_AGENTS_SYSTEM,
                &format!(
                    "## Simulation input\n{}\n\n## Dynamic parameters\n{}",
                    input_json, dp_json
                ),
                parse_agents,
            )
            .await?;

        let agents_json = serde_json::to_string_pretty(&json!({
            "star_configs": star_configs,
            "sea_configs": sea_configs,
        }))
        .unwrap_or_default();
        let default_energy = ctx.config.default_seed_energy;
        let (topology, seed_ripple) = self
            .init_step(
                ctx,
                "topology",
                prompts::INIT_TOPOLOGY_SYSTEM,
                &format!(
                    "## Simulation input\n{}\n\n## Dynamic parameters\n{}\n\n## Agents\n{}",
                    input_json, dp_json, agents_json
                ),
                |raw| parse_topology(raw, default_energy),
            )
            .await?;

        Ok(InitResult {
            dynamic_parameters,
            star_configs,
            sea_configs,
            topology,
            seed_ripple,
        })
    }

    /// Rule on one wave. Exhausted retries produce the safe stop verdict.
    pub async fn verdict(
        &self,
        ctx: &RunContext,
        request: VerdictRequest<'_>,
    ) -> RunResult<Outcome<OmniscientVerdict>> {
        let wave = request.wave;
        let snapshot_json = serde_json::to_string_pretty(request.snapshot).unwrap_or_default();
        let time = TimeProgress::at_wave(wave, request.wave_time_window, request.simulation_horizon);
        let user_prompt = prompts::ripple_verdict_user(
            wave,
            time.as_ref(),
            &snapshot_json,
            request.history,
            &request.snapshot.roster(),
        );
        let label = format!("RIPPLE:verdict:{}", wave);

        let decoded = self
            .call(ctx, &label, &prompts::ripple_verdict_system(wave), &user_prompt, |raw| {
                let obj = extract_json_object(raw)?;
                OmniscientVerdict::from_json(&obj, wave)
            })
            .await?;

        Ok(match decoded {
            Ok(verdict) => Outcome::ok(verdict),
            Err(exhausted) => {
                let reason = exhausted.last_error.to_string();
                error!(run_id = %ctx.run_id, wave, error = %reason, "Verdict failed; stopping propagation safely");
                Outcome::degraded(OmniscientVerdict::fallback(wave, &reason), reason)
            }
        })
    }

    /// Classify the macro state after the last wave.
    pub async fn observe(
        &self,
        ctx: &RunContext,
        snapshot: &FieldSnapshot,
        full_history: &str,
    ) -> RunResult<Outcome<Value>> {
        let snapshot_json = serde_json::to_string_pretty(snapshot).unwrap_or_default();
        let user_prompt = format!(
            "## Field snapshot\n{}\n\n## Full propagation history\n{}",
            snapshot_json, full_history
        );
        let decoded = self
            .call(ctx, "OBSERVE", prompts::OBSERVE_SYSTEM, &user_prompt, |raw| {
                let obj = extract_json_object(raw)?;
                require_fields(&obj, &["phase_vector"])?;
                Ok(Value::Object(obj))
            })
            .await?;

        Ok(match decoded {
            Ok(observation) => Outcome::ok(observation),
            Err(exhausted) => {
                let reason = exhausted.last_error.to_string();
                error!(run_id = %ctx.run_id, error = %reason, "OBSERVE failed; using unknown phase vector");
                Outcome::degraded(default_observation(), reason)
            }
        })
    }

    /// Final structured prediction. The anchored template is used whenever
    /// the input carries historical data.
    pub async fn synthesize(
        &self,
        ctx: &RunContext,
        snapshot: &FieldSnapshot,
        observation: &Value,
        input: &SimulationInput,
    ) -> RunResult<Outcome<Value>> {
        let phase_system = if input.has_historical() {
            prompts::SYNTHESIZE_ANCHORED_SYSTEM
        } else {
            prompts::SYNTHESIZE_RELATIVE_SYSTEM
        };
        let user_prompt = format!(
            "## Field snapshot\n{}\n\n## Observation\n{}\n\n## Simulation input\n{}",
            serde_json::to_string_pretty(snapshot).unwrap_or_default(),
            serde_json::to_string_pretty(observation).unwrap_or_default(),
            input.to_pretty_json()
        );
        let decoded = self
            .call(ctx, "SYNTHESIZE", phase_system, &user_prompt, |raw| {
                let obj = extract_json_object(raw)?;
                require_fields(&obj, &["prediction"])?;
                Ok(Value::Object(obj))
            })
            .await?;

        Ok(match decoded {
            Ok(result) => Outcome::ok(result),
            Err(exhausted) => {
                let reason = exhausted.last_error.to_string();
                error!(run_id = %ctx.run_id, error = %reason, "SYNTHESIZE failed; returning error-tagged prediction");
                Outcome::degraded(default_synthesis(&reason), reason)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamics_keep_extra_fields() {
        let dp = parse_dynamics(
            r#"{"wave_time_window": 4, "energy_decay_per_wave": "0.2", "platform_characteristics": "fast"}"#,
            0.15,
        )
        .unwrap();
        assert_eq!(dp.wave_time_window, "4h");
        assert!((dp.energy_decay_per_wave - 0.2).abs() < 1e-9);
        assert_eq!(dp.estimated_total_waves, None);
        assert_eq!(dp.extra["platform_characteristics"], "fast");
    }

    #[test]
    fn dynamics_require_window() {
        let err = parse_dynamics(r#"{"energy_decay_per_wave": 0.1}"#, 0.15).unwrap_err();
        assert!(matches!(err, ParseError::MissingFields(_)));
    }

    #[test]
    fn agents_must_be_non_empty_and_unique() {
        assert!(parse_agents(r#"{"star_configs": [], "sea_configs": [{"id": "s"}]}"#).is_err());
        assert!(parse_agents(r#"{"star_configs": [{"id": "a"}], "sea_configs": [{"id": "a"}]}"#).is_err());
        assert!(parse_agents(r#"{"star_configs": [{"description": "x"}], "sea_configs": [{"id": "s"}]}"#).is_err());

        let (stars, seas) = parse_agents(
            r#"{"star_configs": [{"id": "kol", "description": "blogger"}], "sea_configs": [{"id": "crowd"}]}"#,
        )
        .unwrap();
        assert_eq!(stars[0].kind, AgentKind::Star);
        assert_eq!(stars[0].description, "blogger");
        assert_eq!(seas[0].kind, AgentKind::Sea);
    }

    #[test]
    fn topology_seed_defaults_energy() {
        let (topology, seed) = parse_topology(
            r#"{"topology": {"edges": []}, "seed_ripple": {"content": "launch"}}"#,
            0.5,
        )
        .unwrap();
        assert_eq!(topology, json!({"edges": []}));
        assert_eq!(seed.content, "launch");
        assert_eq!(seed.initial_energy, 0.5);

        assert!(parse_topology(r#"{"topology": {}, "seed_ripple": "launch"}"#, 0.5).is_err());
    }

    #[test]
    fn safe_defaults_have_expected_shape() {
        assert_eq!(default_observation()["phase_vector"]["heat"], "unknown");
        assert_eq!(default_synthesis("boom")["prediction"]["error"], "boom");
    }
}
