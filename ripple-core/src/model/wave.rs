//! Participant responses and the per-wave record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coerce;
use crate::error::ParseResult;
use crate::json::extract_json_object;

use super::verdict::OmniscientVerdict;

/// Which kind of actor a participant is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// An individual actor.
    Star,
    /// A group or crowd actor.
    Sea,
}

impl AgentKind {
    /// Response types this kind of actor may produce.
    pub fn allowed_responses(self) -> &'static [ResponseType] {
        match self {
            Self::Star => &[
                ResponseType::Amplify,
                ResponseType::Create,
                ResponseType::Comment,
                ResponseType::Ignore,
            ],
            Self::Sea => &[
                ResponseType::Amplify,
                ResponseType::Absorb,
                ResponseType::Mutate,
                ResponseType::Suppress,
                ResponseType::Ignore,
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Star => "star",
            Self::Sea => "sea",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a participant reacted to an incoming ripple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Amplify,
    Create,
    Comment,
    Absorb,
    Mutate,
    Suppress,
    Ignore,
    /// The participant call itself failed.
    Error,
}

impl ResponseType {
    /// Parse a model-supplied label for `kind`. Anything outside the allowed
    /// set becomes `Ignore`.
    pub fn parse_for(kind: AgentKind, label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        kind.allowed_responses()
            .iter()
            .copied()
            .find(|r| r.as_str() == label)
            .unwrap_or(Self::Ignore)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amplify => "amplify",
            Self::Create => "create",
            Self::Comment => "comment",
            Self::Absorb => "absorb",
            Self::Mutate => "mutate",
            Self::Suppress => "suppress",
            Self::Ignore => "ignore",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant's reaction to one activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantResponse {
    pub response_type: ResponseType,
    /// Always within `[0, 1]`.
    pub outgoing_energy: f64,
    /// Free text: an individual's post, or a crowd's collective reaction.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_shift: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl ParticipantResponse {
    /// Decode raw model output for an actor of `kind`.
    pub fn parse(kind: AgentKind, raw: &str) -> ParseResult<Self> {
        let obj = extract_json_object(raw)?;
        let content_key = match kind {
            AgentKind::Star => "response_content",
            AgentKind::Sea => "cluster_reaction",
        };
        let sentiment_shift = match kind {
            AgentKind::Sea => Some(coerce::as_text(obj.get("sentiment_shift"))),
            AgentKind::Star => None,
        };
        Ok(Self {
            response_type: ResponseType::parse_for(
                kind,
                &coerce::as_text(obj.get("response_type")),
            ),
            outgoing_energy: coerce::clamp_unit(coerce::as_f64(obj.get("outgoing_energy"), 0.0)),
            content: coerce::as_text(obj.get(content_key)),
            sentiment_shift,
            reasoning: coerce::as_text(obj.get("reasoning")),
        })
    }

    /// Safe response once a participant's retries are exhausted.
    pub fn ignore_fallback(reason: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Ignore,
            outgoing_energy: 0.0,
            content: String::new(),
            sentiment_shift: None,
            reasoning: reason.into(),
        }
    }

    /// Zero-energy response recorded when a participant call fails outright.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Error,
            outgoing_energy: 0.0,
            content: String::new(),
            sentiment_shift: None,
            reasoning: reason.into(),
        }
    }
}

/// Notable things that happened inside a wave besides the responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaveEvent {
    /// The verdict named an agent that is not registered.
    UnknownAgentDropped { agent_id: String },
    /// The wave-0 guard added a group activation.
    GroupGuardInjected { agent_id: String, energy: f64 },
    /// A participant call failed and was recorded as an error response.
    ParticipantFailed { agent_id: String, error: String },
}

/// Everything that happened in one wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveRecord {
    pub wave_number: u32,
    pub verdict: OmniscientVerdict,
    /// Keyed by agent id; ordering is stable regardless of completion order.
    pub responses: BTreeMap<String, ParticipantResponse>,
    #[serde(default)]
    pub events: Vec<WaveEvent>,
}

impl WaveRecord {
    pub fn response(&self, agent_id: &str) -> Option<&ParticipantResponse> {
        self.responses.get(agent_id)
    }

    pub fn total_outgoing_energy(&self) -> f64 {
        self.responses.values().map(|r| r.outgoing_energy).sum()
    }
}
