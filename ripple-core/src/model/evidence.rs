//! Evidence pack — the bounded digest of a run's propagation that evaluators
//! read instead of the full wave records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::wave::WaveRecord;

/// Upper bound on `key_signals`.
pub const MAX_KEY_SIGNALS: usize = 10;
/// Upper bound on `summary`, in characters.
pub const MAX_SUMMARY_CHARS: usize = 500;
/// Pointer to where the full records live in a persisted run.
pub const FULL_RECORDS_REF: &str = "#/process/waves";

/// A single high-energy response worth an evaluator's attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySignal {
    pub wave_id: u32,
    pub agent_id: String,
    pub response_type: String,
    pub outgoing_energy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropagationStatistics {
    pub waves: usize,
    pub activations: usize,
    pub total_outgoing_energy: f64,
    pub response_histogram: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePack {
    pub source: String,
    pub summary: String,
    pub key_signals: Vec<KeySignal>,
    pub statistics: PropagationStatistics,
    pub full_records_ref: String,
}

impl EvidencePack {
    pub fn from_wave_records(records: &[WaveRecord]) -> Self {
        let source = match (records.first(), records.last()) {
            (Some(first), Some(last)) => format!(
                "RIPPLE Phase, Wave {}-{}",
                first.wave_number, last.wave_number
            ),
            _ => "RIPPLE Phase, no waves".to_string(),
        };

        let mut statistics = PropagationStatistics {
            waves: records.len(),
            ..Default::default()
        };
        let mut signals = Vec::new();
        for record in records {
            statistics.activations += record.verdict.activated_agents.len();
            for (agent_id, response) in &record.responses {
                statistics.total_outgoing_energy += response.outgoing_energy;
                *statistics
                    .response_histogram
                    .entry(response.response_type.as_str().to_string())
                    .or_insert(0) += 1;
                signals.push(KeySignal {
                    wave_id: record.wave_number,
                    agent_id: agent_id.clone(),
                    response_type: response.response_type.as_str().to_string(),
                    outgoing_energy: response.outgoing_energy,
                });
            }
        }

        // Highest energy first; earlier waves win ties.
        signals.sort_by(|a, b| {
            b.outgoing_energy
                .total_cmp(&a.outgoing_energy)
                .then(a.wave_id.cmp(&b.wave_id))
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        signals.truncate(MAX_KEY_SIGNALS);

        let summary = truncate_chars(&compose_summary(records, &statistics), MAX_SUMMARY_CHARS);

        Self {
            source,
            summary,
            key_signals: signals,
            statistics,
            full_records_ref: FULL_RECORDS_REF.to_string(),
        }
    }
}

fn compose_summary(records: &[WaveRecord], stats: &PropagationStatistics) -> String {
    let mut histogram: Vec<(&String, &u32)> = stats.response_histogram.iter().collect();
    histogram.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    let responses = if histogram.is_empty() {
        "none".to_string()
    } else {
        histogram
            .iter()
            .map(|(k, v)| format!("{}({})", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut summary = format!(
        "{} waves, {} activations, total outgoing energy {:.2}; responses: {}.",
        stats.waves, stats.activations, stats.total_outgoing_energy, responses
    );
    if let Some(obs) = records
        .iter()
        .rev()
        .map(|r| r.verdict.global_observation.trim())
        .find(|o| !o.is_empty())
    {
        summary.push_str(" Latest observation: ");
        summary.push_str(obs);
    }
    summary
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::verdict::{AgentActivation, OmniscientVerdict};
    use crate::model::wave::{ParticipantResponse, ResponseType};

    fn wave(n: u32, agents: usize, observation: &str) -> WaveRecord {
        let mut verdict = OmniscientVerdict::fallback(n, "");
        verdict.continue_propagation = true;
        verdict.global_observation = observation.to_string();
        let mut responses = BTreeMap::new();
        for i in 0..agents {
            let id = format!("agent_{}", i);
            verdict.activated_agents.push(AgentActivation::new(&id, 0.5, ""));
            let mut r = ParticipantResponse::ignore_fallback("");
            r.response_type = if i % 2 == 0 { ResponseType::Amplify } else { ResponseType::Ignore };
            r.outgoing_energy = (i as f64 + n as f64) / 100.0;
            responses.insert(id, r);
        }
        WaveRecord { wave_number: n, verdict, responses, events: Vec::new() }
    }

    #[test]
    fn test_empty_records() {
        let pack = EvidencePack::from_wave_records(&[]);
        assert_eq!(pack.source, "RIPPLE Phase, no waves");
        assert!(pack.key_signals.is_empty());
        assert_eq!(pack.full_records_ref, "#/process/waves");
    }

    #[test]
    fn test_pack_is_bounded() {
        let long_obs = "x".repeat(2_000);
        let records: Vec<WaveRecord> = (0..6).map(|n| wave(n, 4, &long_obs)).collect();
        let pack = EvidencePack::from_wave_records(&records);
        assert_eq!(pack.source, "RIPPLE Phase, Wave 0-5");
        assert_eq!(pack.key_signals.len(), MAX_KEY_SIGNALS);
        assert!(pack.summary.chars().count() <= MAX_SUMMARY_CHARS);
        assert_eq!(pack.statistics.waves, 6);
        assert_eq!(pack.statistics.activations, 24);
        assert_eq!(pack.statistics.response_histogram["amplify"], 12);
    }

    #[test]
    fn test_signals_sorted_by_energy() {
        let records: Vec<WaveRecord> = (0..3).map(|n| wave(n, 3, "")).collect();
        let pack = EvidencePack::from_wave_records(&records);
        let energies: Vec<f64> = pack.key_signals.iter().map(|s| s.outgoing_energy).collect();
        let mut sorted = energies.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        assert_eq!(energies, sorted);
        assert_eq!(pack.key_signals[0].wave_id, 2);
        assert_eq!(pack.key_signals[0].agent_id, "agent_2");
    }

    #[test]
    fn test_summary_mentions_latest_observation() {
        let records = vec![wave(0, 1, "quiet"), wave(1, 1, "trending")];
        let pack = EvidencePack::from_wave_records(&records);
        assert!(pack.summary.contains("Latest observation: trending"));
    }
}
