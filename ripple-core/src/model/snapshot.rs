//! Field snapshot — a read view of the run, rebuilt from the wave records
//! every time a consumer asks for one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ripple::Ripple;
use super::wave::{AgentKind, ResponseType, WaveRecord};

const SEED_PREVIEW_CHARS: usize = 200;

/// Static description of a registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub kind: AgentKind,
    pub description: String,
}

/// Cumulative activation statistics for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub activation_count: u32,
    pub last_wave: Option<u32>,
    pub last_energy: f64,
    pub last_response: Option<ResponseType>,
    pub total_outgoing_energy: f64,
}

impl AgentStats {
    /// Fold every recorded activation into per-agent stats.
    pub fn from_records(records: &[WaveRecord]) -> BTreeMap<String, AgentStats> {
        let mut stats: BTreeMap<String, AgentStats> = BTreeMap::new();
        for record in records {
            for activation in &record.verdict.activated_agents {
                let s = stats.entry(activation.agent_id.clone()).or_default();
                s.activation_count += 1;
                s.last_wave = Some(record.wave_number);
                s.last_energy = activation.incoming_ripple_energy;
                let response = record.response(&activation.agent_id);
                s.last_response = response.map(|r| r.response_type);
                s.total_outgoing_energy += response.map_or(0.0, |r| r.outgoing_energy);
            }
        }
        stats
    }
}

/// One agent as seen in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub kind: AgentKind,
    pub description: String,
    pub memory_count: usize,
    #[serde(flatten)]
    pub stats: AgentStats,
}

/// Run-level parameters echoed into every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotParameters {
    pub wave_time_window: String,
    pub simulation_horizon: String,
    pub energy_decay_per_wave: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub seed_content: String,
    pub seed_energy: f64,
    pub stars: Vec<AgentSnapshot>,
    pub seas: Vec<AgentSnapshot>,
    pub wave_records_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_time_window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_horizon: Option<String>,
    pub energy_decay_per_wave: f64,
    #[serde(default)]
    pub topology: serde_json::Value,
}

impl FieldSnapshot {
    /// Build a fresh snapshot. `agents` yields each registered agent with its
    /// current memory size, in registration order.
    pub fn build<'a, I>(
        seed: &Ripple,
        agents: I,
        records: &[WaveRecord],
        params: &SnapshotParameters,
        topology: &serde_json::Value,
    ) -> Self
    where
        I: IntoIterator<Item = (&'a AgentDescriptor, usize)>,
    {
        let mut stats = AgentStats::from_records(records);
        let mut stars = Vec::new();
        let mut seas = Vec::new();
        for (desc, memory_count) in agents {
            let snap = AgentSnapshot {
                id: desc.id.clone(),
                kind: desc.kind,
                description: desc.description.clone(),
                memory_count,
                stats: stats.remove(&desc.id).unwrap_or_default(),
            };
            match desc.kind {
                AgentKind::Star => stars.push(snap),
                AgentKind::Sea => seas.push(snap),
            }
        }

        Self {
            seed_content: seed.preview(SEED_PREVIEW_CHARS),
            seed_energy: seed.energy(),
            stars,
            seas,
            wave_records_count: records.len(),
            wave_time_window: non_empty(&params.wave_time_window),
            simulation_horizon: non_empty(&params.simulation_horizon),
            energy_decay_per_wave: params.energy_decay_per_wave,
            topology: topology.clone(),
        }
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentSnapshot> {
        self.stars.iter().chain(self.seas.iter())
    }

    /// One roster line per agent for the verdict prompt.
    pub fn roster(&self) -> String {
        let lines: Vec<String> = self
            .agents()
            .map(|a| {
                let status = if a.stats.activation_count > 0 {
                    format!(
                        "activated {} times, last energy={:.2}, last response={}",
                        a.stats.activation_count,
                        a.stats.last_energy,
                        a.stats
                            .last_response
                            .map_or("none", ResponseType::as_str)
                    )
                } else {
                    "not yet activated".to_string()
                };
                format!("  - agent_id: \"{}\" ({}): {} | {}", a.id, a.kind, a.description, status)
            })
            .collect();
        if lines.is_empty() {
            "  (no agents registered)".to_string()
        } else {
            lines.join("\n")
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
