//! Shared in-process fakes for the integration tests.
//!
//! No model backend is needed: the decision fake recognises each call by
//! its phase instructions, and the participant fake by the persona line.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use ripple_engine::{
    AgentCaller, CallerError, EngineConfig, PhaseOrchestrator, PhaseOrchestratorBuilder, ProgressEvent,
    ProgressSink, SimulationInput,
};

// ── Replies ──────────────────────────────────────────────────────────────────

pub fn dynamics_reply(window: &str) -> String {
    json!({
        "wave_time_window": window,
        "energy_decay_per_wave": 0.2,
        "estimated_total_waves": 3,
        "platform_characteristics": "short-form video",
    })
    .to_string()
}

pub fn agents_reply(stars: &[&str], seas: &[&str]) -> String {
    let entry = |id: &&str| json!({"id": id, "description": format!("persona of {}", id)});
    json!({
        "star_configs": stars.iter().map(entry).collect::<Vec<_>>(),
        "sea_configs": seas.iter().map(entry).collect::<Vec<_>>(),
    })
    .to_string()
}

pub fn topology_reply(energy: f64) -> String {
    json!({
        "topology": {"edges": [{"from": "alice", "to": "early_adopters", "weight": 0.7}]},
        "seed_ripple": {"content": "A new budget phone with a week-long battery", "initial_energy": energy},
    })
    .to_string()
}

/// Verdict activating `agents` at their energies.
pub fn continue_verdict(agents: &[(&str, f64)]) -> String {
    let activated: Vec<Value> = agents
        .iter()
        .map(|(id, e)| json!({"agent_id": id, "incoming_ripple_energy": e, "activation_reason": "reachable"}))
        .collect();
    json!({
        "simulated_time_elapsed": "4h",
        "simulated_time_remaining": "8h",
        "continue_propagation": true,
        "activated_agents": activated,
        "skipped_agents": [],
        "global_observation": "spreading",
    })
    .to_string()
}

pub fn stop_verdict(reason: &str) -> String {
    json!({
        "continue_propagation": false,
        "termination_reason": reason,
        "activated_agents": [],
        "global_observation": "energy dissipated",
    })
    .to_string()
}

pub fn observation_reply() -> String {
    json!({
        "phase_vector": {"heat": "peak", "sentiment": "positive", "coherence": "high"},
        "phase_transition_detected": false,
        "emergence_events": [],
        "topology_recommendations": [],
    })
    .to_string()
}

pub fn synthesis_reply(grade: &str, scores: &[(&str, u8)]) -> String {
    let scores: BTreeMap<&str, u8> = scores.iter().copied().collect();
    json!({
        "prediction": {"impact": "above typical", "confidence": "medium"},
        "timeline": [],
        "bifurcation_points": [],
        "agent_insights": {},
        "grade": grade,
        "scores": scores,
    })
    .to_string()
}

// ── Decision fake ────────────────────────────────────────────────────────────

type VerdictFn = dyn Fn(u32) -> String + Send + Sync;

/// Decision-agent fake. Verdicts come from a per-wave closure.
pub struct ScriptedDecision {
    pub dynamics: String,
    pub agents: String,
    pub topology: String,
    pub verdict: Box<VerdictFn>,
    pub observation: String,
    pub synthesis: String,
    /// Consumed one per SYNTHESIZE attempt before falling back to `synthesis`.
    pub synthesis_queue: Mutex<VecDeque<String>>,
    /// System prompt of every SYNTHESIZE attempt.
    pub synthesis_systems: Mutex<Vec<String>>,
    pub log: Mutex<Vec<String>>,
}

impl ScriptedDecision {
    /// One star, two seas; wave 0 reaches `alice`, wave 1 stops.
    pub fn new() -> Self {
        Self {
            dynamics: dynamics_reply("4h"),
            agents: agents_reply(&["alice"], &["early_adopters", "mainstream"]),
            topology: topology_reply(0.8),
            verdict: Box::new(|wave| {
                if wave == 0 {
                    continue_verdict(&[("alice", 0.8)])
                } else {
                    stop_verdict("energy below threshold")
                }
            }),
            observation: observation_reply(),
            synthesis: synthesis_reply("B", &[("demand", 4), ("moat", 3)]),
            synthesis_queue: Mutex::new(VecDeque::new()),
            synthesis_systems: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_verdicts(mut self, verdict: impl Fn(u32) -> String + Send + Sync + 'static) -> Self {
        self.verdict = Box::new(verdict);
        self
    }

    pub fn with_agents(mut self, agents: impl Into<String>) -> Self {
        self.agents = agents.into();
        self
    }

    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observation = observation.into();
        self
    }

    pub fn with_synthesis(mut self, synthesis: impl Into<String>) -> Self {
        self.synthesis = synthesis.into();
        self
    }

    pub fn with_synthesis_sequence(self, replies: Vec<String>) -> Self {
        *self.synthesis_queue.lock().unwrap() = replies.into();
        self
    }

    pub fn synthesis_systems(&self) -> Vec<String> {
        self.synthesis_systems.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

fn verdict_wave(system: &str) -> Option<u32> {
    let rest = system.split("deciding wave ").nth(1)?;
    rest.chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

#[async_trait]
impl AgentCaller for ScriptedDecision {
    async fn call(&self, system: &str, _user: &str) -> Result<String, CallerError> {
        let (tag, reply) = if system.contains("choose the simulation's time dynamics") {
            ("init:dynamics".to_string(), self.dynamics.clone())
        } else if system.contains("Design the population") {
            ("init:agents".to_string(), self.agents.clone())
        } else if system.contains("Describe how the actors are connected") {
            ("init:topology".to_string(), self.topology.clone())
        } else if let Some(wave) = verdict_wave(system) {
            (format!("verdict:{}", wave), (self.verdict)(wave))
        } else if system.contains("Classify the macro state") {
            ("observe".to_string(), self.observation.clone())
        } else {
            self.synthesis_systems.lock().unwrap().push(system.to_string());
            let queued = self.synthesis_queue.lock().unwrap().pop_front();
            ("synthesize".to_string(), queued.unwrap_or_else(|| self.synthesis.clone()))
        };
        self.log.lock().unwrap().push(tag);
        Ok(reply)
    }
}

// ── Participant fake ─────────────────────────────────────────────────────────

/// Participant fake. Agents listed in `failing` always fail in transport.
#[derive(Default)]
pub struct ScriptedParticipants {
    pub failing: HashSet<String>,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedParticipants {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

fn persona_id(system: &str) -> String {
    system
        .split("Who you are: persona of ")
        .nth(1)
        .and_then(|rest| rest.lines().next())
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[async_trait]
impl AgentCaller for ScriptedParticipants {
    async fn call(&self, system: &str, _user: &str) -> Result<String, CallerError> {
        let id = persona_id(system);
        self.seen.lock().unwrap().push(id.clone());
        if self.failing.contains(&id) {
            return Err(CallerError::transport(format!("{} backend down", id)));
        }
        Ok(json!({
            "response_type": "amplify",
            "response_content": "sharing this",
            "cluster_reaction": "the group is curious",
            "sentiment_shift": "slightly positive",
            "outgoing_energy": 0.6,
            "reasoning": "fits my interests",
        })
        .to_string())
    }
}

// ── Progress capture ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CapturedProgress(pub Mutex<Vec<ProgressEvent>>);

impl CapturedProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for CapturedProgress {
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

/// Input with a 12h horizon: three planned waves of 4h, nine at most.
pub fn input() -> SimulationInput {
    SimulationInput::from_value(json!({
        "event": "Launch of a budget phone",
        "source": "press release",
        "simulation_horizon": "12h",
    }))
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        decision_max_retries: 1,
        participant_max_retries: 0,
        evaluator_max_retries: 0,
        ..EngineConfig::default()
    }
}

pub fn builder(decision: Arc<ScriptedDecision>, participants: Arc<ScriptedParticipants>) -> PhaseOrchestratorBuilder {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    PhaseOrchestrator::builder()
        .config(fast_config())
        .decision_caller(decision)
        .participant_caller(participants)
        .decision_profile("You simulate consumer electronics launches.")
}
