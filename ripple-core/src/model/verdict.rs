//! Per-wave decisions issued by the decision agent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce;
use crate::error::{ParseError, ParseResult};
use crate::json::require_fields;

/// Energy assumed when a verdict names an agent but omits its energy.
pub const DEFAULT_ACTIVATION_ENERGY: f64 = 0.5;

/// Reason attached to a stop verdict that gave none.
pub const DEFAULT_TERMINATION_REASON: &str = "decision agent ended propagation";

/// One agent the verdict wants to activate this wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentActivation {
    pub agent_id: String,
    pub incoming_ripple_energy: f64,
    pub activation_reason: String,
}

impl AgentActivation {
    pub fn new(agent_id: impl Into<String>, energy: f64, reason: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            incoming_ripple_energy: coerce::clamp_unit(energy),
            activation_reason: reason.into(),
        }
    }
}

/// One agent the verdict deliberately left idle this wave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSkip {
    pub agent_id: String,
    pub skip_reason: String,
}

/// The decision agent's ruling for one wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmniscientVerdict {
    pub wave_number: u32,
    pub simulated_time_elapsed: String,
    pub simulated_time_remaining: String,
    pub continue_propagation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    pub activated_agents: Vec<AgentActivation>,
    pub skipped_agents: Vec<AgentSkip>,
    pub global_observation: String,
}

impl OmniscientVerdict {
    /// Decode a verdict object. The wave number always comes from the
    /// caller, not from the model's echo of it.
    pub fn from_json(obj: &Map<String, Value>, wave_number: u32) -> ParseResult<Self> {
        require_fields(obj, &["continue_propagation"])?;

        let activated_agents = list(obj, "activated_agents")
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let agent_id = required_id(a, "activated_agents", i)?;
                Ok(AgentActivation::new(
                    agent_id,
                    coerce::as_f64(a.get("incoming_ripple_energy"), DEFAULT_ACTIVATION_ENERGY),
                    coerce::as_text(a.get("activation_reason")),
                ))
            })
            .collect::<ParseResult<Vec<_>>>()?;

        let skipped_agents = list(obj, "skipped_agents")
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Ok(AgentSkip {
                    agent_id: required_id(s, "skipped_agents", i)?,
                    skip_reason: coerce::as_text(s.get("skip_reason")),
                })
            })
            .collect::<ParseResult<Vec<_>>>()?;

        let termination_reason = match obj.get("termination_reason") {
            None | Some(Value::Null) => None,
            Some(v) => Some(coerce::as_text(Some(v))).filter(|s| !s.trim().is_empty()),
        };

        Ok(Self {
            wave_number,
            simulated_time_elapsed: coerce::as_text(obj.get("simulated_time_elapsed")),
            simulated_time_remaining: coerce::as_text(obj.get("simulated_time_remaining")),
            continue_propagation: coerce::as_bool(obj.get("continue_propagation")),
            termination_reason,
            activated_agents,
            skipped_agents,
            global_observation: coerce::as_text(obj.get("global_observation")),
        })
    }

    /// Safe stop verdict used once retries are exhausted.
    pub fn fallback(wave_number: u32, error: &str) -> Self {
        Self {
            wave_number,
            simulated_time_elapsed: "unknown".to_string(),
            simulated_time_remaining: "0h".to_string(),
            continue_propagation: false,
            termination_reason: Some(format!("verdict failed: {}", error)),
            activated_agents: Vec::new(),
            skipped_agents: Vec::new(),
            global_observation: "verdict failed, stopping safely".to_string(),
        }
    }

    pub fn activated_ids(&self) -> Vec<&str> {
        self.activated_agents.iter().map(|a| a.agent_id.as_str()).collect()
    }

    pub fn activates(&self, agent_id: &str) -> bool {
        self.activated_agents.iter().any(|a| a.agent_id == agent_id)
    }

    /// Termination reason, or the generic one when the model gave none.
    pub fn stop_reason(&self) -> &str {
        self.termination_reason
            .as_deref()
            .unwrap_or(DEFAULT_TERMINATION_REASON)
    }
}

fn list<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn required_id(entry: &Value, list_name: &str, index: usize) -> ParseResult<String> {
    match entry.get("agent_id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ParseError::invalid(
            format!("{}[{}].agent_id", list_name, index),
            "missing or empty",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::extract_json_object;

    fn parse(raw: &str, wave: u32) -> ParseResult<OmniscientVerdict> {
        OmniscientVerdict::from_json(&extract_json_object(raw)?, wave)
    }

    #[test]
    fn test_parse_full_verdict() {
        let v = parse(
            r#"{
                "wave_number": 99,
                "simulated_time_elapsed": "4h",
                "simulated_time_remaining": "44h",
                "continue_propagation": true,
                "activated_agents": [
                    {"agent_id": "kol_a", "incoming_ripple_energy": {"value": 0.7}, "activation_reason": "follows brand"},
                    {"agent_id": "crowd_b", "incoming_ripple_energy": "1.4"}
                ],
                "skipped_agents": [{"agent_id": "kol_c", "skip_reason": "offline"}],
                "global_observation": "warming up"
            }"#,
            3,
        )
        .unwrap();
        assert_eq!(v.wave_number, 3);
        assert!(v.continue_propagation);
        assert_eq!(v.activated_ids(), vec!["kol_a", "crowd_b"]);
        assert_eq!(v.activated_agents[0].incoming_ripple_energy, 0.7);
        assert_eq!(v.activated_agents[1].incoming_ripple_energy, 1.0);
        assert_eq!(v.activated_agents[1].activation_reason, "");
        assert_eq!(v.skipped_agents[0].skip_reason, "offline");
        assert_eq!(v.termination_reason, None);
    }

    #[test]
    fn test_missing_energy_defaults() {
        let v = parse(
            r#"{"continue_propagation": true, "activated_agents": [{"agent_id": "a"}]}"#,
            0,
        )
        .unwrap();
        assert_eq!(v.activated_agents[0].incoming_ripple_energy, DEFAULT_ACTIVATION_ENERGY);
    }

    #[test]
    fn test_missing_continue_flag_is_error() {
        let err = parse(r#"{"activated_agents": []}"#, 0).unwrap_err();
        assert_eq!(err, ParseError::MissingFields(vec!["continue_propagation".into()]));
    }

    #[test]
    fn test_activation_without_id_is_error() {
        let err = parse(
            r#"{"continue_propagation": true, "activated_agents": [{"incoming_ripple_energy": 0.2}]}"#,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { .. }));
    }

    #[test]
    fn test_stop_reason_default() {
        let v = parse(r#"{"continue_propagation": false, "termination_reason": "  "}"#, 5).unwrap();
        assert_eq!(v.termination_reason, None);
        assert_eq!(v.stop_reason(), DEFAULT_TERMINATION_REASON);
    }

    #[test]
    fn test_fallback_stops() {
        let v = OmniscientVerdict::fallback(2, "bad json");
        assert!(!v.continue_propagation);
        assert_eq!(v.stop_reason(), "verdict failed: bad json");
        assert!(v.activated_agents.is_empty());
    }
}
